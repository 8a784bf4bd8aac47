// SPDX-License-Identifier: MPL-2.0

//! Video recording sink
//!
//! This module provides the recording side of a capture session:
//! - The opaque [`RecordingSink`] boundary and its ordered configuration
//! - The [`CaptureSinkAdapter`] enforcing configure → prepare → start → stop → reset
//! - An in-process [`VirtualSink`]

pub mod adapter;
pub mod sink;
pub mod virtual_sink;

// Re-export commonly used types
pub use adapter::CaptureSinkAdapter;
pub use sink::{
    AudioCodec, OutputFormat, RecordingSink, SinkError, SinkParameter, SinkPhase, SinkSettings,
    VideoCodec,
};
pub use virtual_sink::{SinkOp, VirtualSink, VirtualSinkHandle};
