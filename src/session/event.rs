// SPDX-License-Identifier: GPL-3.0-only

//! Inputs and outputs of the session state machine

use super::state::{DeviceToken, SessionPhase, SessionToken};
use crate::backends::camera::types::{
    CaptureSession, DeviceCapabilities, DeviceEvent, DeviceHandle, DeviceId, RequestKind,
    Rotation, SessionEvent, Size, Surface,
};
use crate::geometry::AffineTransform;
use std::path::PathBuf;

/// Everything that can move the state machine
#[derive(Debug)]
pub enum Event {
    // ===== Intents =====
    /// Open a device whose capabilities were just queried
    Open {
        device: DeviceId,
        capabilities: DeviceCapabilities,
    },
    StartRecording,
    StopRecording,
    Close,
    ViewSizeChanged(Size),
    RotationChanged(Rotation),

    // ===== Hardware callbacks =====
    Device {
        token: DeviceToken,
        event: DeviceEvent,
    },
    Session {
        token: SessionToken,
        event: SessionEvent,
    },

    // ===== Command outcomes =====
    /// The open request was refused synchronously
    OpenFailed { token: DeviceToken, reason: String },
    /// Sink configured and prepared; its input surface is ready to bind
    SinkPrepared { path: PathBuf, surface: Surface },
    /// Sink configuration or prepare failed
    SinkFailed {
        path: Option<PathBuf>,
        reason: String,
    },
    /// Repeating request or sink start failed on a live session
    StreamFailed { token: SessionToken, reason: String },
    /// Every close command has been issued
    CloseComplete,
}

/// Surfaces a new session binds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    Preview,
    PreviewAndRecorder(Surface),
}

impl Targets {
    pub fn request_kind(&self) -> RequestKind {
        match self {
            Targets::Preview => RequestKind::Preview,
            Targets::PreviewAndRecorder(_) => RequestKind::Record,
        }
    }
}

/// Side effects requested by a transition, executed in order
#[derive(Debug)]
pub enum Command {
    OpenDevice {
        device: DeviceId,
        token: DeviceToken,
    },
    CloseDevice(DeviceHandle),
    /// Build the preview surface at the preview size, a request template and
    /// a new session over `targets`
    CreateSession {
        token: SessionToken,
        targets: Targets,
    },
    CloseSession(CaptureSession),
    /// Start the repeating request of the live session `token`
    SetRepeating {
        token: SessionToken,
        kind: RequestKind,
    },
    /// Configure and prepare the sink, reusing `path` if one was assigned
    PrepareSink { path: Option<PathBuf>, size: Size },
    StartSink { token: SessionToken },
    /// Stop writing; faults are reported but do not interrupt the batch
    StopSink { path: PathBuf },
    /// Bring the sink back to idle from any phase
    ResetSink,
    ApplyTransform(AffineTransform),
    Notify(Notice),
}

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PhaseChanged {
        from: SessionPhase,
        to: SessionPhase,
    },
    TransformChanged(AffineTransform),
    /// User-visible: a recording could not be started or was interrupted
    RecordingFailed(String),
    /// User-visible: recording finished and was written to the path
    RecordingSaved(PathBuf),
    /// Transient hardware fault, handled by the controller
    CameraError(String),
}
