// SPDX-License-Identifier: MPL-2.0

//! Capture sink adapter
//!
//! Wraps a [`RecordingSink`] and enforces its lifecycle:
//!
//! ```text
//! Idle ──configure──▶ Configured ──prepare──▶ Prepared ──start──▶ Started
//!  ▲                                                                 │
//!  └────────────────────────── reset ◀──── Stopped ◀────── stop ─────┘
//! ```
//!
//! Out-of-order calls are rejected with [`SinkError::OutOfOrder`] and never
//! reach the sink. `reset` is accepted from every phase but `Idle`.

use super::sink::{RecordingSink, SinkError, SinkPhase, SinkSettings};
use crate::backends::camera::types::Surface;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

pub struct CaptureSinkAdapter {
    sink: Box<dyn RecordingSink>,
    phase: SinkPhase,
    path: Option<PathBuf>,
}

impl CaptureSinkAdapter {
    pub fn new(sink: Box<dyn RecordingSink>) -> Self {
        Self {
            sink,
            phase: SinkPhase::Idle,
            path: None,
        }
    }

    pub fn phase(&self) -> SinkPhase {
        self.phase
    }

    fn expect_phase(&self, operation: &'static str, expected: SinkPhase) -> Result<(), SinkError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SinkError::OutOfOrder {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Push the full configuration sequence. A failing step resets the sink.
    pub fn configure(&mut self, settings: &SinkSettings) -> Result<(), SinkError> {
        self.expect_phase("configure", SinkPhase::Idle)?;

        debug!(
            path = %settings.path.display(),
            size = %settings.size,
            bitrate = settings.bitrate,
            frame_rate = settings.frame_rate,
            "Configuring recording sink"
        );

        for parameter in settings.parameters() {
            if let Err(e) = self.sink.set_parameter(&parameter) {
                error!(parameter = ?parameter, error = %e, "Sink rejected parameter");
                self.sink.reset();
                return Err(e);
            }
        }

        self.phase = SinkPhase::Configured;
        self.path = Some(settings.path.clone());
        Ok(())
    }

    /// Finish configuration and obtain the input surface
    pub fn prepare(&mut self) -> Result<Surface, SinkError> {
        match self.phase {
            SinkPhase::Configured => {}
            SinkPhase::Idle => return Err(SinkError::NotConfigured),
            phase => {
                return Err(SinkError::OutOfOrder {
                    operation: "prepare",
                    phase,
                });
            }
        }

        match self.sink.prepare() {
            Ok(surface) => {
                debug!(surface = ?surface.id, "Recording sink prepared");
                self.phase = SinkPhase::Prepared;
                Ok(surface)
            }
            Err(e) => {
                error!(error = %e, "Sink prepare failed");
                self.sink.reset();
                self.phase = SinkPhase::Idle;
                self.path = None;
                Err(e)
            }
        }
    }

    /// Begin writing
    pub fn start(&mut self) -> Result<(), SinkError> {
        self.expect_phase("start", SinkPhase::Prepared)?;
        self.sink.start()?;
        info!(path = ?self.path, "Recording started");
        self.phase = SinkPhase::Started;
        Ok(())
    }

    /// Stop writing. The sink counts as stopped even if finalizing failed,
    /// so it can always be reset afterwards.
    pub fn stop(&mut self) -> Result<(), SinkError> {
        self.expect_phase("stop", SinkPhase::Started)?;
        self.phase = SinkPhase::Stopped;
        self.sink.stop()?;
        info!(path = ?self.path, "Recording stopped");
        Ok(())
    }

    /// Return to `Idle`, dropping the output path
    pub fn reset(&mut self) -> Result<(), SinkError> {
        if self.phase == SinkPhase::Idle {
            return Err(SinkError::OutOfOrder {
                operation: "reset",
                phase: self.phase,
            });
        }
        self.sink.reset();
        self.phase = SinkPhase::Idle;
        self.path = None;
        Ok(())
    }

    /// Bring the sink back to `Idle` from wherever it is, logging faults
    pub fn abort(&mut self) {
        if self.phase == SinkPhase::Started
            && let Err(e) = self.stop()
        {
            warn!(error = %e, "Sink stop failed while aborting recording");
        }
        if self.phase != SinkPhase::Idle {
            // Not Idle, so reset cannot be out of order
            let _ = self.reset();
        }
    }
}

impl std::fmt::Debug for CaptureSinkAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSinkAdapter")
            .field("phase", &self.phase)
            .field("path", &self.path)
            .finish()
    }
}
