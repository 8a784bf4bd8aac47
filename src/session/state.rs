// SPDX-License-Identifier: GPL-3.0-only

//! Session state
//!
//! Each variant carries exactly the resources that are live in it, so a
//! recording state without a session, or a preview state without a device,
//! cannot be expressed.

use crate::backends::camera::types::{CaptureSession, DeviceHandle, DeviceId, Size, Surface};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifies one device open request.
///
/// Callbacks carry the token they were issued with and are dropped when it
/// no longer matches the controller's live device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceToken(pub u64);

/// Identifies one session creation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionToken(pub u64);

/// Sizes chosen when the device was opened, fixed until it is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedSizes {
    pub record: Size,
    pub preview: Size,
}

/// An opened device with the sizes selected for it
#[derive(Debug)]
pub struct OpenDevice {
    pub token: DeviceToken,
    pub handle: DeviceHandle,
    pub sizes: SelectedSizes,
}

/// Session held during the preview phase
#[derive(Debug)]
pub enum SessionSlot {
    /// Requested, waiting for the configured callback
    Pending(SessionToken),
    /// Configured and streaming
    Live {
        token: SessionToken,
        session: CaptureSession,
    },
    /// A record session abandoned before it configured. Its outcome must
    /// arrive before a preview session is requested again.
    Withdrawn(SessionToken),
}

/// Recorder binding for one record start/stop pair
#[derive(Debug)]
pub struct Recording {
    pub path: PathBuf,
    pub surface: Surface,
}

/// Authoritative view of what the camera is doing
#[derive(Debug, Default)]
pub enum SessionState {
    #[default]
    Idle,
    /// Open requested, device not delivered yet
    Opening {
        token: DeviceToken,
        device: DeviceId,
        sizes: SelectedSizes,
    },
    PreviewActive {
        device: OpenDevice,
        session: SessionSlot,
    },
    /// Preview session closed, preview+record session requested
    ReconfiguringForRecord {
        device: OpenDevice,
        pending: SessionToken,
        recording: Recording,
    },
    RecordActive {
        device: OpenDevice,
        token: SessionToken,
        session: CaptureSession,
        recording: Recording,
    },
    /// Resources handed off for closing
    Closing,
}

/// Data-free view of [`SessionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Idle,
    Opening,
    PreviewActive,
    ReconfiguringForRecord,
    RecordActive,
    Closing,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Opening => "opening",
            SessionPhase::PreviewActive => "preview",
            SessionPhase::ReconfiguringForRecord => "reconfiguring for record",
            SessionPhase::RecordActive => "recording",
            SessionPhase::Closing => "closing",
        };
        f.write_str(name)
    }
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Opening { .. } => SessionPhase::Opening,
            SessionState::PreviewActive { .. } => SessionPhase::PreviewActive,
            SessionState::ReconfiguringForRecord { .. } => SessionPhase::ReconfiguringForRecord,
            SessionState::RecordActive { .. } => SessionPhase::RecordActive,
            SessionState::Closing => SessionPhase::Closing,
        }
    }

    /// Token of the device this state is bound to, requested or open
    pub fn device_token(&self) -> Option<DeviceToken> {
        match self {
            SessionState::Opening { token, .. } => Some(*token),
            _ => self.open_device().map(|device| device.token),
        }
    }

    pub fn open_device(&self) -> Option<&OpenDevice> {
        match self {
            SessionState::PreviewActive { device, .. }
            | SessionState::ReconfiguringForRecord { device, .. }
            | SessionState::RecordActive { device, .. } => Some(device),
            _ => None,
        }
    }

    pub fn sizes(&self) -> Option<SelectedSizes> {
        match self {
            SessionState::Opening { sizes, .. } => Some(*sizes),
            _ => self.open_device().map(|device| device.sizes),
        }
    }

    /// The configured session, if the token is the one it was created for
    pub fn live_session(&self, token: SessionToken) -> Option<&CaptureSession> {
        match self {
            SessionState::PreviewActive {
                session: SessionSlot::Live { token: t, session },
                ..
            } if *t == token => Some(session),
            SessionState::RecordActive {
                token: t, session, ..
            } if *t == token => Some(session),
            _ => None,
        }
    }

    /// Whether a session requested under `token` is still wanted
    pub fn awaits_session(&self, token: SessionToken) -> bool {
        match self {
            SessionState::PreviewActive {
                session: SessionSlot::Pending(pending),
                ..
            }
            | SessionState::ReconfiguringForRecord { pending, .. } => *pending == token,
            _ => false,
        }
    }

    pub fn recording(&self) -> Option<&Recording> {
        match self {
            SessionState::ReconfiguringForRecord { recording, .. }
            | SessionState::RecordActive { recording, .. } => Some(recording),
            _ => None,
        }
    }
}
