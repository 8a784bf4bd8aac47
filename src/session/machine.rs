// SPDX-License-Identifier: GPL-3.0-only

//! Session state machine
//!
//! Pure transition logic: [`SessionMachine::apply`] consumes one [`Event`],
//! moves to the next [`SessionState`] and returns the [`Command`]s that carry
//! the transition out. Nothing here touches hardware or the sink, so every
//! interleaving of intents and callbacks can be driven directly.
//!
//! ```text
//!            open              Opened(token)
//!   Idle ──────────▶ Opening ───────────────▶ PreviewActive ◀─────────────┐
//!    ▲                  │                        │      ▲                  │
//!    │                  │ close     sink prepared│      │ configure failed │ stop
//!    │                  ▼                        ▼      │                  │
//!    └──────────── Closing ◀──── close ── ReconfiguringForRecord ──▶ RecordActive
//!                                                        Configured(token)
//! ```
//!
//! Hardware callbacks carry the [`DeviceToken`] or [`SessionToken`] they were
//! issued with. A callback whose token is not the current one is stale: its
//! resources are released and the state is left untouched.

use super::event::{Command, Event, Notice, Targets};
use super::state::{
    DeviceToken, OpenDevice, Recording, SelectedSizes, SessionPhase, SessionSlot, SessionState,
    SessionToken,
};
use crate::backends::camera::types::{
    AspectRatio, CaptureSession, DeviceCapabilities, DeviceEvent, DeviceHandle, DeviceId,
    RequestKind, Rotation, SessionEvent, Size, Surface,
};
use crate::errors::SessionError;
use crate::geometry::{compute_transform, select_preview_size, select_record_size};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Size selection inputs fixed for the lifetime of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionPolicy {
    pub aspect: AspectRatio,
    pub max_record_width: u32,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self {
            aspect: AspectRatio::WIDESCREEN,
            max_record_width: crate::constants::MAX_RECORD_WIDTH,
        }
    }
}

#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    policy: SelectionPolicy,
    view: Option<Size>,
    rotation: Rotation,
    /// Output path assigned to the next recording, reused after a failed start
    pending_path: Option<PathBuf>,
    next_token: u64,
}

impl SessionMachine {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            state: SessionState::Idle,
            policy,
            view: None,
            rotation: Rotation::Rotate0,
            pending_path: None,
            next_token: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn sizes(&self) -> Option<SelectedSizes> {
        self.state.sizes()
    }

    pub fn view(&self) -> Option<Size> {
        self.view
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn device_handle(&self) -> Option<&DeviceHandle> {
        self.state.open_device().map(|device| &device.handle)
    }

    pub fn live_session(&self, token: SessionToken) -> Option<&CaptureSession> {
        self.state.live_session(token)
    }

    /// Path of the recording in progress, or the one assigned for the next attempt
    pub fn recording_path(&self) -> Option<&Path> {
        self.state
            .recording()
            .map(|recording| recording.path.as_path())
            .or(self.pending_path.as_deref())
    }

    /// Apply one event.
    ///
    /// Usage faults (an intent the current state does not allow) return an
    /// error and leave the state untouched. Hardware callbacks never fail;
    /// stale ones produce at most cleanup commands.
    pub fn apply(&mut self, event: Event) -> Result<Vec<Command>, SessionError> {
        match event {
            Event::Open {
                device,
                capabilities,
            } => self.open(device, &capabilities),
            Event::StartRecording => self.start_recording(),
            Event::StopRecording => self.stop_recording(),
            Event::Close => Ok(self.close()),
            Event::CloseComplete => {
                if matches!(self.state, SessionState::Closing) {
                    self.state = SessionState::Idle;
                }
                Ok(Vec::new())
            }
            Event::ViewSizeChanged(size) => {
                self.view = Some(size);
                Ok(self.transform_command().into_iter().collect())
            }
            Event::RotationChanged(rotation) => {
                self.rotation = rotation;
                Ok(self.transform_command().into_iter().collect())
            }
            Event::Device { token, event } => Ok(self.device_event(token, event)),
            Event::Session { token, event } => Ok(self.session_event(token, event)),
            Event::OpenFailed { token, reason } => Ok(self.open_failed(token, reason)),
            Event::SinkPrepared { path, surface } => self.sink_prepared(path, surface),
            Event::SinkFailed { path, reason } => {
                if path.is_some() {
                    self.pending_path = path;
                }
                Ok(vec![Command::Notify(Notice::RecordingFailed(reason))])
            }
            Event::StreamFailed { token, reason } => Ok(self.stream_failed(token, reason)),
        }
    }

    fn next_device_token(&mut self) -> DeviceToken {
        self.next_token += 1;
        DeviceToken(self.next_token)
    }

    fn next_session_token(&mut self) -> SessionToken {
        self.next_token += 1;
        SessionToken(self.next_token)
    }

    fn take_state(&mut self) -> SessionState {
        std::mem::take(&mut self.state)
    }

    fn transform_command(&self) -> Option<Command> {
        let view = self.view?;
        let sizes = self.state.sizes()?;
        Some(Command::ApplyTransform(compute_transform(
            self.rotation,
            view,
            sizes.preview,
        )))
    }

    /// Commands that return an open device to preview through a fresh session
    fn restart_preview(&mut self, device: OpenDevice) -> Command {
        let token = self.next_session_token();
        self.state = SessionState::PreviewActive {
            device,
            session: SessionSlot::Pending(token),
        };
        Command::CreateSession {
            token,
            targets: Targets::Preview,
        }
    }

    // ===== Intents =====

    fn open(
        &mut self,
        device: DeviceId,
        capabilities: &DeviceCapabilities,
    ) -> Result<Vec<Command>, SessionError> {
        if !matches!(self.state, SessionState::Idle) {
            return Err(SessionError::InvalidState {
                operation: "open camera",
                phase: self.phase(),
            });
        }
        let view = self.view.ok_or(SessionError::ViewNotReady)?;

        let record = select_record_size(
            &capabilities.record_sizes,
            self.policy.aspect,
            self.policy.max_record_width,
        )
        .ok_or(SessionError::NoSupportedSize("record"))?;
        let preview = select_preview_size(&capabilities.preview_sizes, view.landscape(), record)
            .ok_or(SessionError::NoSupportedSize("preview"))?;

        let token = self.next_device_token();
        info!(
            device = %device,
            record = %record,
            preview = %preview,
            "Opening camera"
        );
        self.state = SessionState::Opening {
            token,
            device: device.clone(),
            sizes: SelectedSizes { record, preview },
        };

        let mut commands: Vec<Command> = self.transform_command().into_iter().collect();
        commands.push(Command::OpenDevice { device, token });
        Ok(commands)
    }

    fn start_recording(&mut self) -> Result<Vec<Command>, SessionError> {
        match &self.state {
            SessionState::PreviewActive {
                session: SessionSlot::Live { .. },
                device,
            } => {
                if self.view.is_none() {
                    return Err(SessionError::ViewNotReady);
                }
                Ok(vec![Command::PrepareSink {
                    path: self.pending_path.clone(),
                    size: device.sizes.record,
                }])
            }
            SessionState::Opening { .. } | SessionState::PreviewActive { .. } => {
                Err(SessionError::InvalidState {
                    operation: "start recording",
                    phase: self.phase(),
                })
            }
            SessionState::ReconfiguringForRecord { .. } | SessionState::RecordActive { .. } => {
                Err(SessionError::AlreadyRecording)
            }
            _ => Err(SessionError::CameraNotOpen),
        }
    }

    fn stop_recording(&mut self) -> Result<Vec<Command>, SessionError> {
        match self.take_state() {
            SessionState::RecordActive {
                device,
                session,
                recording,
                ..
            } => {
                info!(path = %recording.path.display(), "Stopping recording");
                self.pending_path = None;
                let restart = self.restart_preview(device);
                Ok(vec![
                    Command::StopSink {
                        path: recording.path,
                    },
                    Command::ResetSink,
                    Command::CloseSession(session),
                    restart,
                ])
            }
            SessionState::ReconfiguringForRecord {
                device, pending, ..
            } => {
                info!("Recording cancelled before it started");
                self.pending_path = None;
                self.state = SessionState::PreviewActive {
                    device,
                    session: SessionSlot::Withdrawn(pending),
                };
                Ok(vec![Command::ResetSink])
            }
            other => {
                self.state = other;
                Err(SessionError::NotRecording)
            }
        }
    }

    fn close(&mut self) -> Vec<Command> {
        let commands = match self.take_state() {
            // Nothing open; closing again is a no-op
            SessionState::Idle => return Vec::new(),
            SessionState::Closing => {
                self.state = SessionState::Closing;
                return Vec::new();
            }
            // The device handle is closed when the stale Opened arrives
            SessionState::Opening { .. } => Vec::new(),
            SessionState::PreviewActive { device, session } => {
                let mut commands = Vec::with_capacity(2);
                if let SessionSlot::Live { session, .. } = session {
                    commands.push(Command::CloseSession(session));
                }
                commands.push(Command::CloseDevice(device.handle));
                commands
            }
            SessionState::ReconfiguringForRecord { device, .. } => {
                vec![Command::ResetSink, Command::CloseDevice(device.handle)]
            }
            SessionState::RecordActive {
                device,
                session,
                recording,
                ..
            } => vec![
                Command::StopSink {
                    path: recording.path,
                },
                Command::ResetSink,
                Command::CloseSession(session),
                Command::CloseDevice(device.handle),
            ],
        };
        info!("Closing camera");
        self.pending_path = None;
        self.state = SessionState::Closing;
        commands
    }

    // ===== Command outcomes =====

    fn open_failed(&mut self, token: DeviceToken, reason: String) -> Vec<Command> {
        match &self.state {
            SessionState::Opening { token: current, .. } if *current == token => {
                warn!(reason = %reason, "Camera open request refused");
                self.state = SessionState::Idle;
                vec![Command::Notify(Notice::CameraError(reason))]
            }
            _ => Vec::new(),
        }
    }

    fn sink_prepared(
        &mut self,
        path: PathBuf,
        surface: Surface,
    ) -> Result<Vec<Command>, SessionError> {
        match self.take_state() {
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Live { session, .. },
            } => {
                let token = self.next_session_token();
                info!(path = %path.display(), "Reconfiguring session for recording");
                self.pending_path = Some(path.clone());
                self.state = SessionState::ReconfiguringForRecord {
                    device,
                    pending: token,
                    recording: Recording {
                        path,
                        surface: surface.clone(),
                    },
                };
                Ok(vec![
                    Command::CloseSession(session),
                    Command::CreateSession {
                        token,
                        targets: Targets::PreviewAndRecorder(surface),
                    },
                ])
            }
            other => {
                let phase = other.phase();
                self.state = other;
                Err(SessionError::InvalidState {
                    operation: "bind recorder",
                    phase,
                })
            }
        }
    }

    fn stream_failed(&mut self, token: SessionToken, reason: String) -> Vec<Command> {
        match self.take_state() {
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Live { token: t, session },
            } if t == token => {
                warn!(reason = %reason, "Preview stream failed");
                self.pending_path = None;
                vec![
                    Command::CloseSession(session),
                    Command::CloseDevice(device.handle),
                    Command::Notify(Notice::CameraError(reason)),
                ]
            }
            SessionState::RecordActive {
                device,
                token: t,
                session,
                ..
            } if t == token => {
                warn!(reason = %reason, "Recording stream failed, returning to preview");
                let restart = self.restart_preview(device);
                vec![
                    Command::ResetSink,
                    Command::CloseSession(session),
                    restart,
                    Command::Notify(Notice::RecordingFailed(reason)),
                ]
            }
            other => {
                debug!(token = ?token, "Ignoring failure of a superseded session");
                self.state = other;
                Vec::new()
            }
        }
    }

    // ===== Hardware callbacks =====

    fn device_event(&mut self, token: DeviceToken, event: DeviceEvent) -> Vec<Command> {
        let reason = match event {
            DeviceEvent::Opened(handle) => return self.device_opened(token, handle),
            DeviceEvent::Disconnected => "camera disconnected".to_string(),
            DeviceEvent::Error(code) => format!("camera error {}", code),
        };

        if self.state.device_token() != Some(token) {
            debug!(token = ?token, reason = %reason, "Dropping stale device callback");
            return Vec::new();
        }

        warn!(reason = %reason, phase = %self.phase(), "Camera lost");
        self.pending_path = None;
        let mut commands = Vec::new();
        match self.take_state() {
            SessionState::PreviewActive { device, session } => {
                if let SessionSlot::Live { session, .. } = session {
                    commands.push(Command::CloseSession(session));
                }
                commands.push(Command::CloseDevice(device.handle));
            }
            SessionState::ReconfiguringForRecord { device, .. } => {
                commands.push(Command::ResetSink);
                commands.push(Command::CloseDevice(device.handle));
                commands.push(Command::Notify(Notice::RecordingFailed(reason.clone())));
            }
            SessionState::RecordActive {
                device,
                session,
                recording,
                ..
            } => {
                commands.push(Command::StopSink {
                    path: recording.path,
                });
                commands.push(Command::ResetSink);
                commands.push(Command::CloseSession(session));
                commands.push(Command::CloseDevice(device.handle));
            }
            SessionState::Opening { .. } | SessionState::Idle | SessionState::Closing => {}
        }
        commands.push(Command::Notify(Notice::CameraError(reason)));
        commands
    }

    fn device_opened(&mut self, token: DeviceToken, handle: DeviceHandle) -> Vec<Command> {
        match self.take_state() {
            SessionState::Opening {
                token: current,
                sizes,
                ..
            } if current == token => {
                info!(handle = ?handle.id, "Camera opened");
                let device = OpenDevice {
                    token,
                    handle,
                    sizes,
                };
                vec![self.restart_preview(device)]
            }
            other => {
                debug!(token = ?token, handle = ?handle.id, "Closing device from stale open");
                self.state = other;
                vec![Command::CloseDevice(handle)]
            }
        }
    }

    fn session_event(&mut self, token: SessionToken, event: SessionEvent) -> Vec<Command> {
        match event {
            SessionEvent::Configured(session) => self.session_configured(token, session),
            SessionEvent::ConfigureFailed => self.session_failed(token),
        }
    }

    fn session_configured(&mut self, token: SessionToken, session: CaptureSession) -> Vec<Command> {
        match self.take_state() {
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Pending(pending),
            } if pending == token => {
                debug!(session = ?session.id, "Preview session configured");
                self.state = SessionState::PreviewActive {
                    device,
                    session: SessionSlot::Live { token, session },
                };
                let mut commands: Vec<Command> = self.transform_command().into_iter().collect();
                commands.push(Command::SetRepeating {
                    token,
                    kind: RequestKind::Preview,
                });
                commands
            }
            SessionState::ReconfiguringForRecord {
                device,
                pending,
                recording,
            } if pending == token => {
                debug!(session = ?session.id, "Record session configured");
                self.state = SessionState::RecordActive {
                    device,
                    token,
                    session,
                    recording,
                };
                vec![
                    Command::SetRepeating {
                        token,
                        kind: RequestKind::Record,
                    },
                    Command::StartSink { token },
                ]
            }
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Withdrawn(withdrawn),
            } if withdrawn == token => {
                debug!(session = ?session.id, "Closing withdrawn record session");
                let restart = self.restart_preview(device);
                vec![Command::CloseSession(session), restart]
            }
            other => {
                let held = other
                    .open_device()
                    .is_some_and(|device| device.handle.id == session.device);
                self.state = other;
                if held {
                    debug!(token = ?token, session = ?session.id, "Closing stale session");
                    vec![Command::CloseSession(session)]
                } else {
                    // Closed along with its device
                    debug!(
                        token = ?token,
                        session = ?session.id,
                        "Dropping session of a released device"
                    );
                    Vec::new()
                }
            }
        }
    }

    fn session_failed(&mut self, token: SessionToken) -> Vec<Command> {
        match self.take_state() {
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Pending(pending),
            } if pending == token => {
                warn!("Preview session configuration failed");
                self.pending_path = None;
                vec![
                    Command::CloseDevice(device.handle),
                    Command::Notify(Notice::CameraError(
                        "capture session configuration failed".to_string(),
                    )),
                ]
            }
            SessionState::ReconfiguringForRecord {
                device, pending, ..
            } if pending == token => {
                warn!("Record session configuration failed, returning to preview");
                let restart = self.restart_preview(device);
                vec![
                    Command::ResetSink,
                    restart,
                    Command::Notify(Notice::RecordingFailed(
                        "capture session configuration failed".to_string(),
                    )),
                ]
            }
            SessionState::PreviewActive {
                device,
                session: SessionSlot::Withdrawn(withdrawn),
            } if withdrawn == token => vec![self.restart_preview(device)],
            other => {
                debug!(token = ?token, "Dropping stale session failure");
                self.state = other;
                Vec::new()
            }
        }
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new(SelectionPolicy::default())
    }
}
