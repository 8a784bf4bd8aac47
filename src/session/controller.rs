// SPDX-License-Identifier: GPL-3.0-only

//! Session controller
//!
//! Owns the [`SessionMachine`], the recording sink and the preview texture
//! behind one lock, and carries out the commands each transition produces.
//! UI intents run on the caller's thread; hardware callbacks are forwarded
//! to the [`BackgroundExecutor`] and handled there. Both paths take the same
//! lock, so transitions never interleave.

use super::event::{Command, Event, Notice, Targets};
use super::machine::SessionMachine;
use super::preview::PreviewTexture;
use super::state::{DeviceToken, SelectedSizes, SessionPhase, SessionToken};
use crate::backends::camera::{
    BackendError, BackgroundExecutor, CameraService, CaptureRequest, ControlMode, DeviceCallback,
    DeviceEvent, RequestKind, Rotation, SessionCallback, SessionEvent, Size,
};
use crate::config::Config;
use crate::constants::EXECUTOR_THREAD_NAME;
use crate::errors::SessionError;
use crate::geometry::AffineTransform;
use crate::pipelines::video::{CaptureSinkAdapter, RecordingSink, SinkPhase, SinkSettings};
use crate::storage::{self, PathProvider};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// A command that could not be carried out
struct Failure {
    /// Fed back into the machine so it can recover
    event: Event,
    /// Reported to the caller of the intent, if there is one
    error: SessionError,
}

impl Failure {
    fn new(event: Event, error: impl Into<SessionError>) -> Self {
        Self {
            event,
            error: error.into(),
        }
    }
}

struct Inner {
    machine: SessionMachine,
    sink: CaptureSinkAdapter,
    preview: PreviewTexture,
    /// Request template of the most recently created session
    request: Option<(SessionToken, CaptureRequest)>,
    transform: AffineTransform,
    config: Config,
    paths: PathProvider,
    view_available: bool,
}

struct Core {
    service: Arc<dyn CameraService>,
    executor: BackgroundExecutor,
    inner: Mutex<Inner>,
    notices: mpsc::UnboundedSender<Notice>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Notice>>>,
}

/// Camera session controller
///
/// # Example
///
/// ```ignore
/// let controller = SessionController::new(service, Box::new(sink), config);
/// controller.on_foreground()?;
/// controller.on_view_available(1080, 1920)?;
/// controller.start_recording()?;
/// controller.stop_recording()?;
/// controller.on_background()?;
/// ```
pub struct SessionController {
    core: Arc<Core>,
}

impl SessionController {
    pub fn new(
        service: Arc<dyn CameraService>,
        sink: Box<dyn RecordingSink>,
        config: Config,
    ) -> Self {
        let (notices, receiver) = mpsc::unbounded_channel();
        let paths =
            storage::directory_provider(config.output_dir.clone(), config.video_codec.container());
        let inner = Inner {
            machine: SessionMachine::new(config.selection_policy()),
            sink: CaptureSinkAdapter::new(sink),
            preview: PreviewTexture::new(),
            request: None,
            transform: AffineTransform::IDENTITY,
            config,
            paths,
            view_available: false,
        };
        Self {
            core: Arc::new(Core {
                service,
                executor: BackgroundExecutor::new(EXECUTOR_THREAD_NAME),
                inner: Mutex::new(inner),
                notices,
                receiver: Mutex::new(Some(receiver)),
            }),
        }
    }

    /// Replace how recording paths are assigned
    pub fn with_path_provider(self, paths: PathProvider) -> Self {
        self.core.lock().paths = paths;
        self
    }

    /// Take the notice stream; only the first call returns it
    pub fn notices(&self) -> Option<mpsc::UnboundedReceiver<Notice>> {
        self.core
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    // ===== Accessors =====

    pub fn phase(&self) -> SessionPhase {
        self.core.lock().machine.phase()
    }

    /// Record and preview sizes of the open device
    pub fn sizes(&self) -> Option<SelectedSizes> {
        self.core.lock().machine.sizes()
    }

    /// Last computed preview transform
    pub fn transform(&self) -> AffineTransform {
        self.core.lock().transform
    }

    pub fn recording_path(&self) -> Option<PathBuf> {
        self.core
            .lock()
            .machine
            .recording_path()
            .map(|path| path.to_path_buf())
    }

    pub fn sink_phase(&self) -> SinkPhase {
        self.core.lock().sink.phase()
    }

    pub fn is_executor_running(&self) -> bool {
        self.core.executor.is_running()
    }

    /// Wait until every callback forwarded so far has been handled
    pub fn flush(&self) -> Result<(), SessionError> {
        if !self.core.executor.is_running() {
            return Ok(());
        }
        Ok(self.core.executor.drain()?)
    }

    // ===== Lifecycle =====

    /// Start the background executor and open the camera if the view is up
    pub fn on_foreground(&self) -> Result<(), SessionError> {
        self.core.executor.start()?;
        let (view, rotation) = {
            let inner = self.core.lock();
            (
                inner.machine.view().filter(|_| inner.view_available),
                inner.machine.rotation(),
            )
        };
        match view {
            Some(view) => self.open_camera(view, rotation),
            None => Ok(()),
        }
    }

    /// Close the camera, then stop the background executor
    pub fn on_background(&self) -> Result<(), SessionError> {
        self.close_camera();
        self.core.executor.stop()?;
        Ok(())
    }

    pub fn on_terminate(&self) {
        self.close_camera();
    }

    /// The preview target became available; open the camera if possible
    pub fn on_view_available(&self, width: u32, height: u32) -> Result<(), SessionError> {
        let view = Size::new(width, height);
        let rotation = {
            let mut inner = self.core.lock();
            inner.view_available = true;
            self.core.dispatch(&mut inner, Event::ViewSizeChanged(view))?;
            if inner.machine.phase() != SessionPhase::Idle {
                return Ok(());
            }
            inner.machine.rotation()
        };
        if !self.core.executor.is_running() {
            debug!("View available before foreground, deferring open");
            return Ok(());
        }
        self.open_camera(view, rotation)
    }

    pub fn on_view_size_changed(&self, width: u32, height: u32) {
        let mut inner = self.core.lock();
        let event = Event::ViewSizeChanged(Size::new(width, height));
        if let Err(e) = self.core.dispatch(&mut inner, event) {
            warn!(error = %e, "View resize not applied");
        }
    }

    pub fn on_rotation_changed(&self, rotation: Rotation) {
        let mut inner = self.core.lock();
        if let Err(e) = self.core.dispatch(&mut inner, Event::RotationChanged(rotation)) {
            warn!(error = %e, "Rotation change not applied");
        }
    }

    // ===== Intents =====

    /// Select sizes for the configured device and request it to open
    pub fn open_camera(&self, view: Size, rotation: Rotation) -> Result<(), SessionError> {
        if !self.core.executor.is_running() {
            return Err(SessionError::ExecutorNotRunning);
        }
        let mut inner = self.core.lock();
        let phase = inner.machine.phase();
        if phase != SessionPhase::Idle {
            return Err(SessionError::InvalidState {
                operation: "open camera",
                phase,
            });
        }

        self.core.dispatch(&mut inner, Event::ViewSizeChanged(view))?;
        self.core.dispatch(&mut inner, Event::RotationChanged(rotation))?;

        let result = self.core.open_configured_device(&mut inner);
        if let Err(e) = &result {
            warn!(error = %e, "Failed to open camera");
        }
        result
    }

    /// Prepare the sink and rebuild the session around it
    pub fn start_recording(&self) -> Result<(), SessionError> {
        let mut inner = self.core.lock();
        self.core.dispatch(&mut inner, Event::StartRecording)
    }

    /// Finish the recording and return to preview
    pub fn stop_recording(&self) -> Result<(), SessionError> {
        let mut inner = self.core.lock();
        self.core.dispatch(&mut inner, Event::StopRecording)
    }

    /// Release every camera resource; safe to call in any state, any number
    /// of times
    pub fn close_camera(&self) {
        let mut inner = self.core.lock();
        if let Err(e) = self.core.dispatch(&mut inner, Event::Close) {
            warn!(error = %e, "Close reported an error");
        }
        if inner.machine.phase() == SessionPhase::Closing
            && let Err(e) = self.core.dispatch(&mut inner, Event::CloseComplete)
        {
            warn!(error = %e, "Close completion reported an error");
        }
        inner.request = None;
    }
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("phase", &self.phase())
            .field("executor", &self.core.executor)
            .finish()
    }
}

impl Core {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notice: Notice) {
        // Nobody listening is fine
        let _ = self.notices.send(notice);
    }

    fn open_configured_device(self: &Arc<Self>, inner: &mut Inner) -> Result<(), SessionError> {
        let index = inner.config.device_index;
        let devices = self.service.enumerate_devices()?;
        let device = devices
            .get(index)
            .cloned()
            .ok_or_else(|| BackendError::DeviceNotFound(format!("no camera at index {}", index)))?;
        let capabilities = self.service.capabilities(&device)?;
        self.dispatch(
            inner,
            Event::Open {
                device,
                capabilities,
            },
        )
    }

    /// Apply one event and carry out everything it leads to
    fn dispatch(self: &Arc<Self>, inner: &mut Inner, event: Event) -> Result<(), SessionError> {
        let commands = self.transition(inner, event)?;
        self.execute(inner, commands)
    }

    fn transition(&self, inner: &mut Inner, event: Event) -> Result<Vec<Command>, SessionError> {
        let from = inner.machine.phase();
        let commands = inner.machine.apply(event)?;
        let to = inner.machine.phase();
        if from != to {
            info!(from = %from, to = %to, "Session state changed");
            self.notify(Notice::PhaseChanged { from, to });
        }
        Ok(commands)
    }

    /// Run commands in order. Follow-up commands from a command's outcome
    /// run before the rest of the batch.
    fn execute(
        self: &Arc<Self>,
        inner: &mut Inner,
        commands: Vec<Command>,
    ) -> Result<(), SessionError> {
        let mut queue = VecDeque::from(commands);
        let mut outcome = Ok(());

        while let Some(command) = queue.pop_front() {
            let follow_up = match self.perform(inner, command) {
                Ok(None) => continue,
                Ok(Some(event)) => event,
                Err(Failure { event, error }) => {
                    if outcome.is_ok() {
                        outcome = Err(error);
                    }
                    event
                }
            };
            match self.transition(inner, follow_up) {
                Ok(follow) => {
                    for command in follow.into_iter().rev() {
                        queue.push_front(command);
                    }
                }
                Err(e) => {
                    error!(error = %e, "Command outcome rejected, resetting sink");
                    inner.sink.abort();
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }
        outcome
    }

    fn perform(
        self: &Arc<Self>,
        inner: &mut Inner,
        command: Command,
    ) -> Result<Option<Event>, Failure> {
        match command {
            Command::OpenDevice { device, token } => {
                debug!(device = %device, token = ?token, "Requesting device open");
                let callback = self.device_callback(token);
                self.service.open(&device, callback).map_err(|e| {
                    Failure::new(
                        Event::OpenFailed {
                            token,
                            reason: e.to_string(),
                        },
                        e,
                    )
                })?;
                Ok(None)
            }
            Command::CloseDevice(handle) => {
                debug!(handle = ?handle.id, "Closing device");
                self.service.close_device(handle);
                Ok(None)
            }
            Command::CreateSession { token, targets } => self.create_session(inner, token, targets),
            Command::CloseSession(session) => {
                debug!(session = ?session.id, "Closing session");
                self.service.close_session(session);
                Ok(None)
            }
            Command::SetRepeating { token, kind } => self.set_repeating(inner, token, kind),
            Command::PrepareSink { path, size } => Self::prepare_sink(inner, path, size),
            Command::StartSink { token } => {
                if inner.machine.live_session(token).is_none() {
                    debug!(token = ?token, "Skipping sink start for a superseded session");
                    return Ok(None);
                }
                inner.sink.start().map_err(|e| {
                    error!(error = %e, "Recording sink failed to start");
                    Failure::new(
                        Event::StreamFailed {
                            token,
                            reason: e.to_string(),
                        },
                        e,
                    )
                })?;
                Ok(None)
            }
            Command::StopSink { path } => {
                match inner.sink.stop() {
                    Ok(()) => self.notify(Notice::RecordingSaved(path)),
                    Err(e) => {
                        error!(error = %e, path = %path.display(), "Recording sink failed to stop");
                        self.notify(Notice::RecordingFailed(e.to_string()));
                    }
                }
                Ok(None)
            }
            Command::ResetSink => {
                inner.sink.abort();
                Ok(None)
            }
            Command::ApplyTransform(transform) => {
                debug!(transform = ?transform, "Preview transform updated");
                inner.transform = transform;
                self.notify(Notice::TransformChanged(transform));
                Ok(None)
            }
            Command::Notify(notice) => {
                self.notify(notice);
                Ok(None)
            }
        }
    }

    fn create_session(
        self: &Arc<Self>,
        inner: &mut Inner,
        token: SessionToken,
        targets: Targets,
    ) -> Result<Option<Event>, Failure> {
        if !inner.machine.state().awaits_session(token) {
            debug!(token = ?token, "Skipping superseded session request");
            return Ok(None);
        }
        let (Some(handle), Some(sizes)) = (inner.machine.device_handle(), inner.machine.sizes())
        else {
            return Ok(None);
        };
        let failed = move |e: BackendError| {
            warn!(error = %e, token = ?token, "Session request refused");
            Failure::new(
                Event::Session {
                    token,
                    event: SessionEvent::ConfigureFailed,
                },
                e,
            )
        };

        let mut surfaces = vec![inner.preview.create_surface(sizes.preview)];
        if let Targets::PreviewAndRecorder(recorder) = &targets {
            surfaces.push(recorder.clone());
        }

        let request = self
            .service
            .create_request(handle, targets.request_kind(), &surfaces)
            .map_err(failed)?;
        inner.request = Some((token, request));

        debug!(token = ?token, targets = surfaces.len(), "Requesting capture session");
        let callback = self.session_callback(token);
        self.service
            .create_session(handle, &surfaces, callback)
            .map_err(failed)?;
        Ok(None)
    }

    fn set_repeating(
        &self,
        inner: &mut Inner,
        token: SessionToken,
        kind: RequestKind,
    ) -> Result<Option<Event>, Failure> {
        let Some(session) = inner.machine.live_session(token) else {
            debug!(token = ?token, "Skipping repeating request for a superseded session");
            return Ok(None);
        };
        let stream_failed = |reason: String| {
            warn!(reason = %reason, kind = ?kind, "Repeating request failed");
            Failure::new(
                Event::StreamFailed {
                    token,
                    reason: reason.clone(),
                },
                BackendError::Other(reason),
            )
        };
        let request = match &inner.request {
            Some((t, request)) if *t == token => {
                request.clone().with_control_mode(ControlMode::Auto)
            }
            _ => return Err(stream_failed("no request template".to_string())),
        };
        self.service
            .set_repeating_request(session, &request)
            .map_err(|e| stream_failed(e.to_string()))?;
        debug!(session = ?session.id, kind = ?kind, "Repeating request started");
        Ok(None)
    }

    fn prepare_sink(
        inner: &mut Inner,
        path: Option<PathBuf>,
        size: Size,
    ) -> Result<Option<Event>, Failure> {
        let path = match path {
            Some(path) => path,
            None => (inner.paths)().map_err(|e| {
                error!(error = %e, "No recording path available");
                Failure::new(
                    Event::SinkFailed {
                        path: None,
                        reason: e.to_string(),
                    },
                    SessionError::Storage(e.to_string()),
                )
            })?,
        };

        let settings = SinkSettings::from_config(&inner.config, path.clone(), size);
        let prepared = inner
            .sink
            .configure(&settings)
            .and_then(|()| inner.sink.prepare());
        match prepared {
            Ok(surface) => Ok(Some(Event::SinkPrepared { path, surface })),
            Err(e) => {
                error!(error = %e, path = %path.display(), "Recording sink setup failed");
                Err(Failure::new(
                    Event::SinkFailed {
                        path: Some(path),
                        reason: e.to_string(),
                    },
                    e,
                ))
            }
        }
    }

    // ===== Callback routing =====

    fn device_callback(self: &Arc<Self>, token: DeviceToken) -> DeviceCallback {
        let core = Arc::downgrade(self);
        Arc::new(move |event| {
            if let Some(core) = core.upgrade() {
                core.forward(Event::Device { token, event });
            }
        })
    }

    fn session_callback(self: &Arc<Self>, token: SessionToken) -> SessionCallback {
        let core = Arc::downgrade(self);
        Box::new(move |event| {
            if let Some(core) = core.upgrade() {
                core.forward(Event::Session { token, event });
            }
        })
    }

    /// Hand a hardware callback to the executor
    fn forward(self: &Arc<Self>, event: Event) {
        let core: Weak<Core> = Arc::downgrade(self);
        let submitted = self.executor.submit_with(event, move |event| {
            if let Some(core) = core.upgrade() {
                core.handle_callback(event);
            }
        });
        if let Err(event) = submitted {
            self.release(event);
        }
    }

    fn handle_callback(self: &Arc<Self>, event: Event) {
        let mut inner = self.lock();
        if let Err(e) = self.dispatch(&mut inner, event) {
            debug!(error = %e, "Callback handling reported an error");
        }
    }

    /// Close resources delivered while nothing can process them
    fn release(&self, event: Event) {
        match event {
            Event::Device {
                event: DeviceEvent::Opened(handle),
                ..
            } => {
                debug!(handle = ?handle.id, "Executor stopped, closing late device");
                self.service.close_device(handle);
            }
            Event::Session {
                event: SessionEvent::Configured(session),
                ..
            } => {
                debug!(session = ?session.id, "Executor stopped, closing late session");
                self.service.close_session(session);
            }
            other => debug!(event = ?other, "Executor stopped, dropping callback"),
        }
    }
}
