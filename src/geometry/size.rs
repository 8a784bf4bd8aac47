// SPDX-License-Identifier: GPL-3.0-only

//! Output size selection
//!
//! Both selectors are pure functions of the candidate list and the bounds,
//! and only ever return an element of the candidate list.

use crate::backends::camera::types::{AspectRatio, Size};

/// Pick the recording size.
///
/// The first candidate (in device order) with exactly `preferred` aspect
/// ratio and a width of at most `max_width`; otherwise the last candidate.
/// Returns `None` only for an empty candidate list.
pub fn select_record_size(
    candidates: &[Size],
    preferred: AspectRatio,
    max_width: u32,
) -> Option<Size> {
    candidates
        .iter()
        .find(|size| preferred.matches(size) && size.width <= max_width)
        .or_else(|| candidates.last())
        .copied()
}

/// Pick the preview size.
///
/// Among candidates with the same aspect ratio as `record` whose edges are
/// at least `minimum`, the one with the smallest area (first one wins a
/// tie); otherwise the first candidate. Returns `None` only for an empty
/// candidate list.
pub fn select_preview_size(candidates: &[Size], minimum: Size, record: Size) -> Option<Size> {
    candidates
        .iter()
        .filter(|size| {
            size.same_aspect(&record)
                && size.width >= minimum.width
                && size.height >= minimum.height
        })
        .min_by_key(|size| size.area())
        .or_else(|| candidates.first())
        .copied()
}
