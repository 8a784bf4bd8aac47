// SPDX-License-Identifier: MPL-2.0

//! Recording pipelines
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera Frame │ ──▶ │  Recording Sink   │ ──▶ │   MP4 File   │
//! │   (surface)  │     │  - Encoder        │     │              │
//! │              │     │  - Muxer          │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`video`]: Recording sink boundary and lifecycle adapter

pub mod video;
