// SPDX-License-Identifier: MPL-2.0

//! Storage utilities for recording files

use crate::constants::{APP_DIR, RECORDING_PREFIX, RECORDING_TIMESTAMP_FORMAT};
use crate::pipelines::video::OutputFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Produces the output path for the next recording
pub type PathProvider = Box<dyn FnMut() -> std::io::Result<PathBuf> + Send>;

/// `<video_dir>/camera-session`, or the current directory if the platform
/// has no video directory
pub fn default_video_dir() -> PathBuf {
    dirs::video_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Timestamped file name for a recording started now
pub fn recording_file_name(format: OutputFormat) -> String {
    let timestamp = chrono::Local::now().format(RECORDING_TIMESTAMP_FORMAT);
    format!("{}{}.{}", RECORDING_PREFIX, timestamp, format.extension())
}

/// Create `dir` if needed and return a fresh recording path inside it
pub fn new_recording_path(dir: &Path, format: OutputFormat) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(recording_file_name(format));
    debug!(path = %path.display(), "Assigned recording path");
    Ok(path)
}

/// Provider writing timestamped files into `dir`
pub fn directory_provider(dir: PathBuf, format: OutputFormat) -> PathProvider {
    Box::new(move || new_recording_path(&dir, format))
}
