// SPDX-License-Identifier: GPL-3.0-only

//! Pure geometry helpers: output size selection and the preview
//! orientation transform

pub mod size;
pub mod transform;

pub use size::{select_preview_size, select_record_size};
pub use transform::{AffineTransform, compute_transform};
