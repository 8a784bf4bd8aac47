// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the session controller against the virtual camera
//!
//! The camera delivers callbacks only when a test releases them, so every
//! interleaving below is deterministic.

use camera_session::backends::camera::{
    BackendError, ControlMode, RequestKind, Rotation, ServiceCall, Size, VirtualCameraService,
};
use camera_session::pipelines::video::{
    SinkError, SinkOp, SinkPhase, VirtualSink, VirtualSinkHandle,
};
use camera_session::session::{Notice, SessionController, SessionPhase};
use camera_session::{Config, SessionError};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tempfile::TempDir;
use tokio::sync::mpsc;

struct Harness {
    service: Arc<VirtualCameraService>,
    sink: VirtualSinkHandle,
    controller: SessionController,
    notices: mpsc::UnboundedReceiver<Notice>,
    dir: TempDir,
}

fn harness_with(config: impl FnOnce(&mut Config)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let service = Arc::new(VirtualCameraService::new().deferred());
    let sink = VirtualSink::new();
    let handle = sink.handle();

    let mut settings = Config::default();
    settings.output_dir = dir.path().to_path_buf();
    config(&mut settings);

    let controller = SessionController::new(service.clone(), Box::new(sink), settings);
    let notices = controller.notices().unwrap();
    controller.on_foreground().unwrap();

    Harness {
        service,
        sink: handle,
        controller,
        notices,
        dir,
    }
}

fn harness() -> Harness {
    harness_with(|_| {})
}

impl Harness {
    /// Release callbacks until nothing is in flight
    fn settle(&self) {
        loop {
            self.controller.flush().unwrap();
            if self.service.deliver_all() == 0 {
                break;
            }
        }
    }

    fn drain(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }

    fn phases(&mut self) -> Vec<(SessionPhase, SessionPhase)> {
        self.drain()
            .into_iter()
            .filter_map(|notice| match notice {
                Notice::PhaseChanged { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    fn open_preview(&mut self) {
        self.controller
            .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
            .unwrap();
        self.settle();
        assert_eq!(self.controller.phase(), SessionPhase::PreviewActive);
    }

    fn start_recording(&mut self) {
        self.controller.start_recording().unwrap();
        self.settle();
        assert_eq!(self.controller.phase(), SessionPhase::RecordActive);
    }

    fn last_repeating(&self) -> Option<(RequestKind, ControlMode)> {
        self.service.calls().into_iter().rev().find_map(|call| match call {
            ServiceCall::SetRepeating {
                kind, control_mode, ..
            } => Some((kind, control_mode)),
            _ => None,
        })
    }

    fn assert_clean(&self) {
        assert!(
            self.service.violations().is_empty(),
            "violations: {:?}",
            self.service.violations()
        );
    }

    fn assert_released(&self) {
        assert_eq!(self.service.open_device_count(), 0);
        assert_eq!(self.service.live_session_count(), 0);
        self.assert_clean();
    }
}

#[test]
fn test_open_selects_sizes_and_reaches_preview() {
    let mut h = harness();
    h.open_preview();

    let sizes = h.controller.sizes().unwrap();
    assert_eq!(sizes.record, Size::new(1920, 1080));
    assert_eq!(sizes.preview, Size::new(1920, 1080));
    assert_eq!(
        h.phases(),
        vec![
            (SessionPhase::Idle, SessionPhase::Opening),
            (SessionPhase::Opening, SessionPhase::PreviewActive),
        ]
    );
    assert_eq!(
        h.last_repeating(),
        Some((RequestKind::Preview, ControlMode::Auto))
    );
    assert_eq!(h.service.live_session_count(), 1);
    assert!(h.controller.transform().is_identity());
    h.assert_clean();
}

#[test]
fn test_start_recording_reconfigures_session() {
    let mut h = harness();
    h.open_preview();
    h.drain();
    h.service.clear_calls();

    h.start_recording();

    assert_eq!(
        h.phases(),
        vec![
            (SessionPhase::PreviewActive, SessionPhase::ReconfiguringForRecord),
            (SessionPhase::ReconfiguringForRecord, SessionPhase::RecordActive),
        ]
    );
    assert_eq!(
        h.sink.lifecycle(),
        vec![SinkOp::Configure, SinkOp::Prepare, SinkOp::Start]
    );
    assert_eq!(h.controller.sink_phase(), SinkPhase::Started);

    // The preview session is gone before the record session is requested
    let calls = h.service.calls();
    let closed = calls
        .iter()
        .position(|c| matches!(c, ServiceCall::CloseSession(_)))
        .unwrap();
    let created = calls
        .iter()
        .position(|c| {
            matches!(c, ServiceCall::CreateSession { targets, .. } if targets.len() == 2)
        })
        .unwrap();
    assert!(closed < created);
    assert_eq!(
        h.last_repeating(),
        Some((RequestKind::Record, ControlMode::Auto))
    );

    let path = h.controller.recording_path().unwrap();
    assert_eq!(path.parent(), Some(h.dir.path()));
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_stop_recording_returns_to_preview() {
    let mut h = harness();
    h.open_preview();
    h.start_recording();
    let path = h.controller.recording_path().unwrap();
    h.drain();

    h.controller.stop_recording().unwrap();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(h.controller.recording_path(), None);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);
    assert_eq!(h.sink.lifecycle()[3..], [SinkOp::Stop, SinkOp::Reset]);
    assert_eq!(
        h.last_repeating(),
        Some((RequestKind::Preview, ControlMode::Auto))
    );
    assert!(h.drain().contains(&Notice::RecordingSaved(path)));
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_close_while_opening_ignores_late_device() {
    let h = harness();
    h.controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
        .unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::Opening);

    h.controller.close_camera();
    assert_eq!(h.controller.phase(), SessionPhase::Idle);

    // The open completes after the close
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(
        !h.service
            .calls()
            .iter()
            .any(|c| matches!(c, ServiceCall::CreateSession { .. }))
    );
    h.assert_released();
    assert!(h.sink.ops().is_empty());
}

#[test]
fn test_sink_configure_failure_keeps_preview() {
    let mut h = harness();
    h.open_preview();
    h.drain();
    h.service.clear_calls();
    h.sink.fail_next_configure("no space left on device");

    let result = h.controller.start_recording();

    assert!(matches!(
        result,
        Err(SessionError::Sink(SinkError::Configure(_)))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert!(h.service.calls().is_empty());
    assert!(
        h.drain()
            .iter()
            .any(|n| matches!(n, Notice::RecordingFailed(_)))
    );

    h.start_recording();
    assert_eq!(
        h.sink.output_files(),
        vec![h.controller.recording_path().unwrap()]
    );
    h.assert_clean();
}

#[test]
fn test_sink_prepare_failure_reuses_path() {
    let mut h = harness();
    h.open_preview();
    h.sink.fail_next_prepare("encoder busy");

    assert!(matches!(
        h.controller.start_recording(),
        Err(SessionError::Sink(SinkError::Prepare(_)))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);

    // The retry writes to the path assigned on the first attempt
    h.start_recording();
    let files = h.sink.output_files();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], files[1]);
    h.assert_clean();
}

#[test]
fn test_close_is_idempotent() {
    let mut h = harness();
    h.open_preview();
    h.start_recording();
    let path = h.controller.recording_path().unwrap();

    h.controller.close_camera();
    h.controller.close_camera();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.controller.sizes().is_none());
    assert!(h.controller.recording_path().is_none());
    assert!(h.drain().contains(&Notice::RecordingSaved(path)));
    h.assert_released();

    h.service.clear_calls();
    h.controller.close_camera();
    assert!(h.service.calls().is_empty());
}

#[test]
fn test_stop_during_reconfigure_discards_record_session() {
    let mut h = harness();
    h.open_preview();

    // Record session requested but not configured yet
    h.controller.start_recording().unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::ReconfiguringForRecord);
    h.controller.stop_recording().unwrap();
    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);

    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(
        h.last_repeating(),
        Some((RequestKind::Preview, ControlMode::Auto))
    );
    assert_eq!(
        h.sink.lifecycle(),
        vec![SinkOp::Configure, SinkOp::Prepare, SinkOp::Reset]
    );
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_record_session_failure_returns_to_preview() {
    let mut h = harness();
    h.open_preview();
    h.service.fail_next_session();

    h.controller.start_recording().unwrap();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);
    assert_eq!(h.sink.ops().last(), Some(&SinkOp::Reset));
    assert!(
        h.drain()
            .iter()
            .any(|n| matches!(n, Notice::RecordingFailed(_)))
    );
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_record_repeating_failure_never_starts_sink() {
    let mut h = harness();
    h.open_preview();
    h.service
        .fail_next_repeating(BackendError::Other("stream refused".to_string()));

    h.controller.start_recording().unwrap();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(
        h.sink.lifecycle(),
        vec![SinkOp::Configure, SinkOp::Prepare, SinkOp::Reset]
    );
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_disconnect_while_recording_releases_everything() {
    let mut h = harness();
    h.open_preview();
    h.start_recording();

    h.service.disconnect_all();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);
    let notices = h.drain();
    assert!(notices.iter().any(|n| matches!(n, Notice::CameraError(_))));
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, Notice::RecordingSaved(_)))
    );
    h.assert_released();
}

#[test]
fn test_device_error_during_preview_goes_idle() {
    let mut h = harness();
    h.open_preview();

    h.service.error_all(4);
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    h.assert_released();
}

#[test]
fn test_disconnect_after_close_is_stale() {
    let mut h = harness();
    h.open_preview();

    // Queued before the close, delivered after it
    h.service.disconnect_all();
    h.controller.close_camera();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(!h.drain().iter().any(|n| matches!(n, Notice::CameraError(_))));
    h.assert_released();
}

#[test]
fn test_reopen_after_close() {
    let mut h = harness();
    h.open_preview();
    h.controller.close_camera();
    h.settle();
    h.assert_released();

    h.open_preview();
    assert_eq!(h.service.open_device_count(), 1);
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_rotation_updates_transform() {
    let mut h = harness();
    h.controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate90)
        .unwrap();
    h.settle();

    assert!(!h.controller.transform().is_identity());
    assert!(
        h.drain()
            .iter()
            .any(|n| matches!(n, Notice::TransformChanged(t) if !t.is_identity()))
    );

    h.controller.on_rotation_changed(Rotation::Rotate0);
    assert!(h.controller.transform().is_identity());

    h.controller.on_rotation_changed(Rotation::Rotate270);
    h.controller.on_view_size_changed(1280, 720);
    assert!(!h.controller.transform().is_identity());
}

#[test]
fn test_usage_faults_leave_state_untouched() {
    let mut h = harness();
    assert_eq!(
        h.controller.start_recording(),
        Err(SessionError::CameraNotOpen)
    );
    assert_eq!(
        h.controller.stop_recording(),
        Err(SessionError::NotRecording)
    );

    h.open_preview();
    assert_eq!(
        h.controller.stop_recording(),
        Err(SessionError::NotRecording)
    );
    assert!(matches!(
        h.controller
            .open_camera(Size::new(1920, 1080), Rotation::Rotate0),
        Err(SessionError::InvalidState { .. })
    ));

    h.start_recording();
    assert_eq!(
        h.controller.start_recording(),
        Err(SessionError::AlreadyRecording)
    );
    assert_eq!(h.controller.phase(), SessionPhase::RecordActive);
    h.assert_clean();
}

#[test]
fn test_missing_device_index_is_reported() {
    let h = harness_with(|config| config.device_index = 5);
    let result = h
        .controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate0);

    assert!(matches!(
        result,
        Err(SessionError::Backend(BackendError::DeviceNotFound(_)))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.service.calls().is_empty());
}

#[test]
fn test_refused_open_returns_to_idle() {
    let mut h = harness();
    h.service
        .fail_next_open(BackendError::Access("camera in use".to_string()));

    let result = h
        .controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate0);

    assert!(matches!(
        result,
        Err(SessionError::Backend(BackendError::Access(_)))
    ));
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.drain().iter().any(|n| matches!(n, Notice::CameraError(_))));
}

#[test]
fn test_view_available_opens_only_in_foreground() {
    let service = Arc::new(VirtualCameraService::new().deferred());
    let controller =
        SessionController::new(service.clone(), Box::new(VirtualSink::new()), Config::default());

    controller.on_view_available(1280, 720).unwrap();
    assert_eq!(controller.phase(), SessionPhase::Idle);
    assert_eq!(
        controller.open_camera(Size::new(1280, 720), Rotation::Rotate0),
        Err(SessionError::ExecutorNotRunning)
    );

    // Foreground opens because the view is already there
    controller.on_foreground().unwrap();
    assert_eq!(controller.phase(), SessionPhase::Opening);
    assert_eq!(controller.sizes().unwrap().preview, Size::new(1280, 720));
}

#[test]
fn test_background_releases_late_callbacks() {
    let h = harness();
    h.controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
        .unwrap();

    h.controller.on_background().unwrap();
    assert!(!h.controller.is_executor_running());

    // Opened arrives with nothing left to handle it
    assert_eq!(h.service.deliver_all(), 1);
    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    h.assert_released();
}

#[test]
fn test_path_provider_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("clip.mp4");
    let service = Arc::new(VirtualCameraService::new().deferred());
    let sink = VirtualSink::new();
    let handle = sink.handle();
    let wanted = target.clone();
    let controller = SessionController::new(service.clone(), Box::new(sink), Config::default())
        .with_path_provider(Box::new(move || Ok(wanted.clone())));
    controller.on_foreground().unwrap();
    controller
        .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
        .unwrap();
    loop {
        controller.flush().unwrap();
        if service.deliver_all() == 0 {
            break;
        }
    }

    controller.start_recording().unwrap();
    assert_eq!(controller.recording_path(), Some(target.clone()));
    assert_eq!(handle.output_files(), vec![PathBuf::from(&target)]);
    controller.on_background().unwrap();
}

#[test]
fn test_sink_stop_fault_still_returns_to_preview() {
    let mut h = harness();
    h.open_preview();
    h.start_recording();
    h.drain();
    h.sink.fail_next_stop("muxer error");

    h.controller.stop_recording().unwrap();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);
    assert_eq!(h.controller.recording_path(), None);
    let notices = h.drain();
    assert!(notices.iter().any(|n| matches!(n, Notice::RecordingFailed(_))));
    assert!(!notices.iter().any(|n| matches!(n, Notice::RecordingSaved(_))));
    assert_eq!(
        h.last_repeating(),
        Some((RequestKind::Preview, ControlMode::Auto))
    );
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();
}

#[test]
fn test_sink_start_fault_returns_to_preview() {
    let mut h = harness();
    h.open_preview();
    h.sink.fail_next_start("encoder refused");

    // The sink starts from the record session callback, not the intent
    h.controller.start_recording().unwrap();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::PreviewActive);
    assert_eq!(h.controller.sink_phase(), SinkPhase::Idle);
    assert!(
        h.drain()
            .iter()
            .any(|n| matches!(n, Notice::RecordingFailed(_)))
    );
    assert_eq!(h.service.live_session_count(), 1);
    h.assert_clean();

    // A later attempt records normally
    h.start_recording();
}

#[test]
fn test_terminate_releases_everything() {
    let mut h = harness();
    h.open_preview();
    h.start_recording();
    let path = h.controller.recording_path().unwrap();

    h.controller.on_terminate();
    h.settle();

    assert_eq!(h.controller.phase(), SessionPhase::Idle);
    assert!(h.drain().contains(&Notice::RecordingSaved(path)));
    h.assert_released();
}

#[test]
fn test_intents_race_callbacks_without_leaks() {
    for round in 0..50 {
        let h = harness();
        h.controller
            .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
            .unwrap();

        // Hardware callbacks arrive on their own thread while intents run here
        let running = Arc::new(AtomicBool::new(true));
        let pump = {
            let running = Arc::clone(&running);
            let service = Arc::clone(&h.service);
            thread::spawn(move || {
                while running.load(Ordering::SeqCst) {
                    service.deliver_all();
                    thread::yield_now();
                }
            })
        };

        for _ in 0..=round % 3 {
            thread::yield_now();
        }
        // Rejected intents are expected depending on how far the open got
        let _ = h.controller.start_recording();
        if round % 2 == 0 {
            let _ = h.controller.stop_recording();
            let _ = h.controller.start_recording();
        }
        h.controller.close_camera();

        running.store(false, Ordering::SeqCst);
        pump.join().unwrap();
        h.settle();

        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        h.assert_released();
    }
}

#[test]
fn test_background_races_open_without_leaks() {
    for _ in 0..50 {
        let h = harness();
        h.controller
            .open_camera(Size::new(1920, 1080), Rotation::Rotate0)
            .unwrap();

        let pump = {
            let service = Arc::clone(&h.service);
            thread::spawn(move || {
                service.deliver_all();
            })
        };
        h.controller.on_background().unwrap();
        pump.join().unwrap();
        // Anything still queued arrives after the executor stopped
        h.service.deliver_all();

        assert_eq!(h.controller.phase(), SessionPhase::Idle);
        h.assert_released();
    }
}
