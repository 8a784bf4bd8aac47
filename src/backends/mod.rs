// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for camera capture
//!
//! # Modules
//!
//! - [`camera`]: Camera service boundary, background executor and the
//!   in-process virtual camera

pub mod camera;
