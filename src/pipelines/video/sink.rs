// SPDX-License-Identifier: MPL-2.0

//! Recording sink boundary
//!
//! The sink is an opaque encoder/muxer fed through one input surface. It is
//! configured by a sequence of parameters whose order matters to the
//! underlying recorder, then prepared, started, stopped and reset.

use crate::backends::camera::types::{Size, Surface};
use crate::config::Config;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Video codec for the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoCodec {
    #[default]
    H264,
    Hevc,
    Vp8,
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 => write!(f, "H.264"),
            VideoCodec::Hevc => write!(f, "H.265"),
            VideoCodec::Vp8 => write!(f, "VP8"),
        }
    }
}

impl VideoCodec {
    /// Container this codec is written into
    pub fn container(&self) -> OutputFormat {
        match self {
            VideoCodec::H264 | VideoCodec::Hevc => OutputFormat::Mpeg4,
            VideoCodec::Vp8 => OutputFormat::Webm,
        }
    }
}

/// Audio codec for the recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AudioCodec {
    #[default]
    Aac,
    Opus,
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioCodec::Aac => write!(f, "AAC"),
            AudioCodec::Opus => write!(f, "Opus"),
        }
    }
}

/// Container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    Mpeg4,
    Webm,
}

impl OutputFormat {
    /// File extension for this container
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mpeg4 => "mp4",
            OutputFormat::Webm => "webm",
        }
    }
}

/// One step of the sink configuration sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkParameter {
    /// Capture audio from the microphone
    AudioSourceMic,
    /// Video frames arrive through the sink's input surface
    VideoSourceSurface,
    OutputFormat(OutputFormat),
    OutputFile(PathBuf),
    VideoBitrate(u32),
    FrameRate(u32),
    VideoSize(Size),
    VideoEncoder(VideoCodec),
    AudioEncoder(AudioCodec),
}

/// Everything needed to configure one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkSettings {
    pub path: PathBuf,
    pub size: Size,
    /// Bits per second
    pub bitrate: u32,
    pub frame_rate: u32,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    pub output_format: OutputFormat,
    pub record_audio: bool,
}

impl SinkSettings {
    /// Settings for one recording of `size` into `path`
    pub fn from_config(config: &Config, path: PathBuf, size: Size) -> Self {
        Self {
            path,
            size,
            bitrate: config.bitrate_kbps(size.width).saturating_mul(1000),
            frame_rate: config.frame_rate,
            video_codec: config.video_codec,
            audio_codec: config.audio_codec,
            output_format: config.video_codec.container(),
            record_audio: config.record_audio,
        }
    }

    /// The ordered configuration sequence.
    ///
    /// Sources come first, then the container, then the output file, then
    /// stream parameters, and the encoders last.
    pub fn parameters(&self) -> Vec<SinkParameter> {
        let mut params = Vec::with_capacity(9);
        if self.record_audio {
            params.push(SinkParameter::AudioSourceMic);
        }
        params.push(SinkParameter::VideoSourceSurface);
        params.push(SinkParameter::OutputFormat(self.output_format));
        params.push(SinkParameter::OutputFile(self.path.clone()));
        params.push(SinkParameter::VideoBitrate(self.bitrate));
        params.push(SinkParameter::FrameRate(self.frame_rate));
        params.push(SinkParameter::VideoSize(self.size));
        params.push(SinkParameter::VideoEncoder(self.video_codec));
        if self.record_audio {
            params.push(SinkParameter::AudioEncoder(self.audio_codec));
        }
        params
    }
}

/// Lifecycle phase of a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkPhase {
    /// Fresh or reset; accepts configuration
    Idle,
    Configured,
    /// Input surface available
    Prepared,
    Started,
    Stopped,
}

impl std::fmt::Display for SinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SinkPhase::Idle => "idle",
            SinkPhase::Configured => "configured",
            SinkPhase::Prepared => "prepared",
            SinkPhase::Started => "started",
            SinkPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Sink and adapter errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Operation issued in a phase that does not allow it
    #[error("sink {operation} is not allowed while {phase}")]
    OutOfOrder {
        operation: &'static str,
        phase: SinkPhase,
    },
    /// `prepare` before a complete configuration
    #[error("sink prepared before being configured")]
    NotConfigured,
    #[error("sink configuration failed: {0}")]
    Configure(String),
    #[error("sink prepare failed: {0}")]
    Prepare(String),
    #[error("sink start failed: {0}")]
    Start(String),
    #[error("sink stop failed: {0}")]
    Stop(String),
}

/// Opaque recording destination
pub trait RecordingSink: Send {
    /// Apply one configuration step
    fn set_parameter(&mut self, parameter: &SinkParameter) -> Result<(), SinkError>;

    /// Finish configuration and expose the input surface
    fn prepare(&mut self) -> Result<Surface, SinkError>;

    /// Begin writing frames that arrive on the input surface
    fn start(&mut self) -> Result<(), SinkError>;

    /// Stop writing and finalize the output file
    fn stop(&mut self) -> Result<(), SinkError>;

    /// Return to the unconfigured state, dropping the input surface
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(record_audio: bool) -> SinkSettings {
        SinkSettings {
            path: PathBuf::from("/tmp/video.mp4"),
            size: Size::new(1920, 1080),
            bitrate: 10_000_000,
            frame_rate: 30,
            video_codec: VideoCodec::H264,
            audio_codec: AudioCodec::Aac,
            output_format: OutputFormat::Mpeg4,
            record_audio,
        }
    }

    #[test]
    fn test_parameter_order() {
        let params = settings(true).parameters();
        assert_eq!(params.first(), Some(&SinkParameter::AudioSourceMic));
        assert_eq!(params.last(), Some(&SinkParameter::AudioEncoder(AudioCodec::Aac)));

        let position = |wanted: &SinkParameter| params.iter().position(|p| p == wanted).unwrap();
        let format = position(&SinkParameter::OutputFormat(OutputFormat::Mpeg4));
        let file = position(&SinkParameter::OutputFile(PathBuf::from("/tmp/video.mp4")));
        let encoder = position(&SinkParameter::VideoEncoder(VideoCodec::H264));
        assert!(format < file && file < encoder);
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        let settings = SinkSettings::from_config(
            &config,
            PathBuf::from("/tmp/a.mp4"),
            Size::new(1920, 1080),
        );
        assert_eq!(settings.bitrate, 10_000_000);
        assert_eq!(settings.frame_rate, 30);
        assert_eq!(settings.output_format, OutputFormat::Mpeg4);

        config.bitrate_override_kbps = None;
        config.bitrate_preset = crate::constants::BitratePreset::Low;
        config.video_codec = VideoCodec::Vp8;
        let settings = SinkSettings::from_config(
            &config,
            PathBuf::from("/tmp/a.webm"),
            Size::new(1280, 720),
        );
        assert_eq!(settings.bitrate, 2_500_000);
        assert_eq!(settings.output_format, OutputFormat::Webm);
    }

    #[test]
    fn test_video_only_sequence() {
        let params = settings(false).parameters();
        assert_eq!(params.len(), 7);
        assert!(!params.contains(&SinkParameter::AudioSourceMic));
        assert_eq!(params.first(), Some(&SinkParameter::VideoSourceSurface));
    }
}
