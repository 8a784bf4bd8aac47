// SPDX-License-Identifier: MPL-2.0

//! In-process recording sink
//!
//! Accepts the same configuration sequence a real recorder does and enforces
//! its ordering rules, but writes nothing. Every operation is journaled and
//! faults can be injected through a [`VirtualSinkHandle`] that stays usable
//! after the sink itself has been handed to a controller.

use super::sink::{RecordingSink, SinkError, SinkParameter};
use crate::backends::camera::types::{Size, Surface, SurfaceId, SurfaceKind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Journal entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Parameter(SinkParameter),
    /// A run of consecutive parameters, as reported by [`VirtualSinkHandle::lifecycle`]
    Configure,
    Prepare,
    Start,
    Stop,
    Reset,
}

#[derive(Default)]
struct Shared {
    ops: Vec<SinkOp>,
    fail_configure: Option<String>,
    fail_prepare: Option<String>,
    fail_start: Option<String>,
    fail_stop: Option<String>,
}

#[derive(Default)]
struct Config {
    has_format: bool,
    has_file: bool,
    video_size: Option<Size>,
    has_video_encoder: bool,
    prepared: bool,
}

/// Sink that validates and journals instead of encoding
pub struct VirtualSink {
    shared: Arc<Mutex<Shared>>,
    config: Config,
}

/// Inspection and fault injection for a [`VirtualSink`]
#[derive(Clone)]
pub struct VirtualSinkHandle {
    shared: Arc<Mutex<Shared>>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VirtualSink {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            config: Config::default(),
        }
    }

    pub fn handle(&self) -> VirtualSinkHandle {
        VirtualSinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record(&self, op: SinkOp) -> MutexGuard<'_, Shared> {
        let mut shared = lock(&self.shared);
        shared.ops.push(op);
        shared
    }
}

impl Default for VirtualSink {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSinkHandle {
    /// Every operation in call order
    pub fn ops(&self) -> Vec<SinkOp> {
        lock(&self.shared).ops.clone()
    }

    /// Operations with each run of parameters collapsed into `Configure`
    pub fn lifecycle(&self) -> Vec<SinkOp> {
        let mut lifecycle: Vec<SinkOp> = Vec::new();
        for op in lock(&self.shared).ops.iter() {
            match op {
                SinkOp::Parameter(_) => {
                    if lifecycle.last() != Some(&SinkOp::Configure) {
                        lifecycle.push(SinkOp::Configure);
                    }
                }
                other => lifecycle.push(other.clone()),
            }
        }
        lifecycle
    }

    /// Output files this sink has been configured with
    pub fn output_files(&self) -> Vec<std::path::PathBuf> {
        lock(&self.shared)
            .ops
            .iter()
            .filter_map(|op| match op {
                SinkOp::Parameter(SinkParameter::OutputFile(path)) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn fail_next_configure(&self, reason: &str) {
        lock(&self.shared).fail_configure = Some(reason.to_string());
    }

    pub fn fail_next_prepare(&self, reason: &str) {
        lock(&self.shared).fail_prepare = Some(reason.to_string());
    }

    pub fn fail_next_start(&self, reason: &str) {
        lock(&self.shared).fail_start = Some(reason.to_string());
    }

    pub fn fail_next_stop(&self, reason: &str) {
        lock(&self.shared).fail_stop = Some(reason.to_string());
    }
}

impl RecordingSink for VirtualSink {
    fn set_parameter(&mut self, parameter: &SinkParameter) -> Result<(), SinkError> {
        let mut shared = self.record(SinkOp::Parameter(parameter.clone()));
        if let Some(reason) = shared.fail_configure.take() {
            return Err(SinkError::Configure(reason));
        }
        drop(shared);

        if self.config.prepared {
            return Err(SinkError::Configure(format!(
                "{:?} set after prepare",
                parameter
            )));
        }

        match parameter {
            SinkParameter::OutputFormat(_) => self.config.has_format = true,
            SinkParameter::OutputFile(_)
            | SinkParameter::VideoEncoder(_)
            | SinkParameter::AudioEncoder(_)
                if !self.config.has_format =>
            {
                return Err(SinkError::Configure(format!(
                    "{:?} set before output format",
                    parameter
                )));
            }
            SinkParameter::OutputFile(_) => self.config.has_file = true,
            SinkParameter::VideoSize(size) => self.config.video_size = Some(*size),
            SinkParameter::VideoEncoder(_) => self.config.has_video_encoder = true,
            _ => {}
        }
        Ok(())
    }

    fn prepare(&mut self) -> Result<Surface, SinkError> {
        let mut shared = self.record(SinkOp::Prepare);
        if let Some(reason) = shared.fail_prepare.take() {
            return Err(SinkError::Prepare(reason));
        }
        drop(shared);

        let (true, true, Some(size)) = (
            self.config.has_file,
            self.config.has_video_encoder,
            self.config.video_size,
        ) else {
            return Err(SinkError::Prepare("incomplete configuration".to_string()));
        };

        self.config.prepared = true;
        let surface = Surface {
            id: SurfaceId::next(),
            kind: SurfaceKind::Recorder,
            size,
        };
        debug!(surface = ?surface.id, size = %size, "Virtual sink prepared");
        Ok(surface)
    }

    fn start(&mut self) -> Result<(), SinkError> {
        let mut shared = self.record(SinkOp::Start);
        match shared.fail_start.take() {
            Some(reason) => Err(SinkError::Start(reason)),
            None => Ok(()),
        }
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        let mut shared = self.record(SinkOp::Stop);
        match shared.fail_stop.take() {
            Some(reason) => Err(SinkError::Stop(reason)),
            None => Ok(()),
        }
    }

    fn reset(&mut self) {
        drop(self.record(SinkOp::Reset));
        self.config = Config::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::video::sink::{OutputFormat, VideoCodec};
    use std::path::PathBuf;

    #[test]
    fn test_file_before_format_is_rejected() {
        let mut sink = VirtualSink::new();
        let result = sink.set_parameter(&SinkParameter::OutputFile(PathBuf::from("a.mp4")));
        assert!(matches!(result, Err(SinkError::Configure(_))));
    }

    #[test]
    fn test_prepare_requires_complete_configuration() {
        let mut sink = VirtualSink::new();
        sink.set_parameter(&SinkParameter::OutputFormat(OutputFormat::Mpeg4))
            .unwrap();
        assert!(matches!(sink.prepare(), Err(SinkError::Prepare(_))));

        sink.set_parameter(&SinkParameter::OutputFile(PathBuf::from("a.mp4")))
            .unwrap();
        sink.set_parameter(&SinkParameter::VideoSize(Size::new(640, 480)))
            .unwrap();
        sink.set_parameter(&SinkParameter::VideoEncoder(VideoCodec::H264))
            .unwrap();
        let surface = sink.prepare().unwrap();
        assert_eq!(surface.kind, SurfaceKind::Recorder);
        assert_eq!(surface.size, Size::new(640, 480));

        // Parameters are frozen once prepared
        assert!(sink
            .set_parameter(&SinkParameter::FrameRate(60))
            .is_err());
    }
}
