// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for camera session operations
//!
//! This module drives a [`SessionController`] against the in-process
//! virtual camera for:
//! - Listing available cameras
//! - Running a preview session
//! - Recording videos

use camera_session::backends::camera::{CameraService, Size, VirtualCameraService};
use camera_session::constants::{format_bitrate, get_resolution_label};
use camera_session::pipelines::video::VirtualSink;
use camera_session::session::{Notice, SessionController, SessionPhase};
use camera_session::{AppError, AppResult, Config};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// View size the CLI pretends to render into
const VIEW: Size = Size::new(1920, 1080);

/// Controller wired to the virtual camera with deferred callbacks
struct VirtualRig {
    service: Arc<VirtualCameraService>,
    controller: SessionController,
    notices: Option<mpsc::UnboundedReceiver<Notice>>,
}

impl VirtualRig {
    fn new(config: Config, output: Option<PathBuf>) -> Self {
        let service = Arc::new(VirtualCameraService::new().deferred());
        let dyn_service: Arc<dyn CameraService> = service.clone();
        let mut controller =
            SessionController::new(dyn_service, Box::new(VirtualSink::new()), config);
        if let Some(path) = output {
            controller = controller.with_path_provider(Box::new(move || Ok(path.clone())));
        }
        let notices = controller.notices();
        Self {
            service,
            controller,
            notices,
        }
    }

    /// Deliver hardware callbacks until the controller has nothing in flight
    fn pump(&self) -> AppResult<()> {
        loop {
            self.controller.flush()?;
            if self.service.deliver_all() == 0 {
                return Ok(());
            }
        }
    }

    fn print_notices(&mut self) {
        let Some(notices) = self.notices.as_mut() else {
            return;
        };
        while let Ok(notice) = notices.try_recv() {
            match notice {
                Notice::RecordingSaved(path) => println!("Video saved: {}", path.display()),
                Notice::RecordingFailed(reason) => println!("Recording failed: {}", reason),
                Notice::CameraError(reason) => println!("Camera error: {}", reason),
                Notice::PhaseChanged { .. } | Notice::TransformChanged(_) => {}
            }
        }
    }

    fn open(&mut self) -> AppResult<()> {
        self.controller.on_foreground()?;
        self.controller.on_view_available(VIEW.width, VIEW.height)?;
        self.pump()?;
        self.print_notices();

        if self.controller.phase() != SessionPhase::PreviewActive {
            return Err(AppError::Other(format!(
                "camera did not reach preview (state: {})",
                self.controller.phase()
            )));
        }
        if let Some(sizes) = self.controller.sizes() {
            println!("Preview: {}", sizes.preview);
            println!(
                "Record:  {} ({})",
                sizes.record,
                get_resolution_label(sizes.record.width).unwrap_or("custom")
            );
        }
        Ok(())
    }

    fn close(&mut self) -> AppResult<()> {
        self.controller.on_background()?;
        self.print_notices();
        let leaks = self.service.open_device_count() + self.service.live_session_count();
        if leaks > 0 {
            return Err(AppError::Other(format!("{} camera resource(s) left open", leaks)));
        }
        Ok(())
    }
}

/// Install a Ctrl+C handler and return the flag it raises
fn stop_flag() -> AppResult<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let flag_clone = flag.clone();
    ctrlc::set_handler(move || {
        flag_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Other(e.to_string()))?;
    Ok(flag)
}

/// Wait until `duration` elapsed or Ctrl+C, printing progress
fn wait(label: &str, duration: Option<Duration>, stop: &AtomicBool) -> AppResult<()> {
    let start = Instant::now();
    loop {
        if stop.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if duration.is_some_and(|d| start.elapsed() >= d) {
            break;
        }

        let elapsed = start.elapsed().as_secs();
        print!("\r{}: {:02}:{:02}", label, elapsed / 60, elapsed % 60);
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    println!();
    Ok(())
}

/// List all available cameras
pub fn list_cameras() -> AppResult<()> {
    let service = VirtualCameraService::new();
    let devices = service.enumerate_devices().map_err(|e| AppError::Other(e.to_string()))?;

    if devices.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras:");
    println!();
    for (index, device) in devices.iter().enumerate() {
        println!("  [{}] {}", index, device);
        let Ok(capabilities) = service.capabilities(device) else {
            continue;
        };
        let join = |sizes: &[Size]| {
            sizes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!("      Record:  {}", join(&capabilities.record_sizes));
        println!("      Preview: {}", join(&capabilities.preview_sizes));
        println!();
    }

    Ok(())
}

/// Run preview for `seconds`, or until Ctrl+C
pub fn run_preview(config: Config, seconds: Option<u64>) -> AppResult<()> {
    let mut rig = VirtualRig::new(config, None);
    rig.open()?;

    println!();
    println!("Previewing... (press Ctrl+C to stop)");
    let stop = stop_flag()?;
    wait("Preview", seconds.map(Duration::from_secs), &stop)?;

    rig.close()
}

/// Record a video of `duration` seconds
pub fn record_video(config: Config, duration: u64, output: Option<PathBuf>) -> AppResult<()> {
    let mut rig = VirtualRig::new(config.clone(), output);
    rig.open()?;

    if let Some(sizes) = rig.controller.sizes() {
        let bitrate = format_bitrate(config.bitrate_kbps(sizes.record.width));
        match config.bitrate_override_kbps {
            Some(_) => println!("Bitrate: {}", bitrate),
            None => println!(
                "Bitrate: {} ({} preset)",
                bitrate,
                config.bitrate_preset.display_name()
            ),
        }
    }

    rig.controller.start_recording()?;
    rig.pump()?;
    rig.print_notices();
    if rig.controller.phase() != SessionPhase::RecordActive {
        let _ = rig.close();
        return Err(AppError::Other("recording did not start".to_string()));
    }
    if let Some(path) = rig.controller.recording_path() {
        println!("Output: {}", path.display());
    }

    println!();
    println!("Recording... (press Ctrl+C to stop early)");
    let stop = stop_flag()?;
    wait("Recording", Some(Duration::from_secs(duration)), &stop)?;

    rig.controller.stop_recording()?;
    rig.pump()?;
    rig.print_notices();

    rig.close()
}

/// Print the effective configuration and where it is stored
pub fn show_config(config: &Config) -> AppResult<()> {
    match Config::path() {
        Ok(path) => println!("# {}", path.display()),
        Err(e) => println!("# {}", e),
    }
    let json = serde_json::to_string_pretty(config).map_err(|e| AppError::Other(e.to_string()))?;
    println!("{}", json);
    Ok(())
}
