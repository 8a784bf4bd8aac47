// SPDX-License-Identifier: MPL-2.0

//! Camera session - capture session control for a camera recorder
//!
//! This library owns the lifecycle of a camera device and its capture
//! sessions: opening the device, streaming preview, switching to recording
//! and back, and releasing everything on close, while hardware callbacks
//! arrive asynchronously and possibly late.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`backends`]: Camera hardware boundary and background executor
//! - [`geometry`]: Output size selection and preview orientation transform
//! - [`pipelines`]: Recording sink boundary and its lifecycle adapter
//! - [`session`]: Session state machine and controller
//! - [`config`]: User configuration handling
//! - [`storage`]: Recording file naming
//!
//! # Example
//!
//! ```ignore
//! let service = Arc::new(VirtualCameraService::new());
//! let controller = SessionController::new(service, Box::new(VirtualSink::new()), Config::default());
//! controller.on_foreground()?;
//! controller.on_view_available(1920, 1080)?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod geometry;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use errors::{AppError, AppResult, SessionError};
pub use session::{Notice, SessionController, SessionPhase};
