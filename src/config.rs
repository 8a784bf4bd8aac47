// SPDX-License-Identifier: GPL-3.0-only

use crate::backends::camera::types::AspectRatio;
use crate::constants::{
    APP_DIR, BitratePreset, DEFAULT_BITRATE_KBPS, DEFAULT_FRAME_RATE, MAX_RECORD_WIDTH,
};
use crate::errors::ConfigError;
use crate::pipelines::video::{AudioCodec, VideoCodec};
use crate::session::SelectionPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Index into the enumerated device list
    pub device_index: usize,
    /// Aspect ratio recordings should match
    pub preferred_aspect: AspectRatio,
    /// Widest recording size to pick
    pub max_record_width: u32,
    pub frame_rate: u32,
    /// Video encoder bitrate preset (Low, Medium, High)
    pub bitrate_preset: BitratePreset,
    /// Fixed bitrate that takes precedence over the preset
    pub bitrate_override_kbps: Option<u32>,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Whether recordings include microphone audio
    pub record_audio: bool,
    /// Where new recordings are written
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_index: 0,
            preferred_aspect: AspectRatio::WIDESCREEN,
            max_record_width: MAX_RECORD_WIDTH,
            frame_rate: DEFAULT_FRAME_RATE,
            bitrate_preset: BitratePreset::default(), // Default to Medium
            bitrate_override_kbps: Some(DEFAULT_BITRATE_KBPS),
            video_codec: VideoCodec::default(),
            audio_codec: AudioCodec::default(),
            record_audio: true,
            output_dir: crate::storage::default_video_dir(),
        }
    }
}

impl Config {
    /// Default location, `<config_dir>/camera-session/config.json`
    pub fn path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, falling back to defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(write_err)?;
        info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Effective recording bitrate in kbps for a recording of `width`
    pub fn bitrate_kbps(&self, width: u32) -> u32 {
        self.bitrate_override_kbps
            .unwrap_or_else(|| self.bitrate_preset.bitrate_kbps(width))
    }

    pub fn selection_policy(&self) -> SelectionPolicy {
        SelectionPolicy {
            aspect: self.preferred_aspect,
            max_record_width: self.max_record_width,
        }
    }
}
