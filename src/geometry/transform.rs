// SPDX-License-Identifier: GPL-3.0-only

//! Preview orientation transform
//!
//! Maps the camera buffer onto the view when the display is rotated a
//! quarter turn away from the sensor. Matrices are 2x3 affine, applied to
//! column vectors: `x' = a*x + b*y + c`, `y' = d*x + e*y + f`.

use crate::backends::camera::types::{Rotation, Size};

/// 2D affine transform in view coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: AffineTransform = AffineTransform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Apply `self`, then `next`
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            a: next.a * self.a + next.b * self.d,
            b: next.a * self.b + next.b * self.e,
            c: next.a * self.c + next.b * self.f + next.c,
            d: next.d * self.a + next.e * self.d,
            e: next.d * self.b + next.e * self.e,
            f: next.d * self.c + next.e * self.f + next.f,
        }
    }

    /// Uniform scale about a pivot point
    pub fn scale_about(scale: f32, px: f32, py: f32) -> AffineTransform {
        AffineTransform {
            a: scale,
            b: 0.0,
            c: px - scale * px,
            d: 0.0,
            e: scale,
            f: py - scale * py,
        }
    }

    /// Rotation by a multiple of 90 degrees about a pivot point.
    ///
    /// Positive angles turn clockwise on screen (y grows downwards). Sine and
    /// cosine are taken exactly so quarter turns do not accumulate error.
    pub fn rotate_about(degrees: i32, px: f32, py: f32) -> AffineTransform {
        let (sin, cos) = match degrees.rem_euclid(360) {
            90 => (1.0, 0.0),
            180 => (0.0, -1.0),
            270 => (-1.0, 0.0),
            _ => (0.0, 1.0),
        };
        AffineTransform {
            a: cos,
            b: -sin,
            c: sin * py + (1.0 - cos) * px,
            d: sin,
            e: cos,
            f: -sin * px + (1.0 - cos) * py,
        }
    }

    /// Scale-to-fill mapping from `src` onto `dst` (aspect not preserved)
    fn rect_to_rect(src: &Rect, dst: &Rect) -> AffineTransform {
        let sx = dst.width() / src.width();
        let sy = dst.height() / src.height();
        AffineTransform {
            a: sx,
            b: 0.0,
            c: dst.left - src.left * sx,
            d: 0.0,
            e: sy,
            f: dst.top - src.top * sy,
        }
    }

    pub fn map_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x + self.b * y + self.c,
            self.d * x + self.e * y + self.f,
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    left: f32,
    top: f32,
    right: f32,
    bottom: f32,
}

impl Rect {
    fn from_size(width: f32, height: f32) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: width,
            bottom: height,
        }
    }

    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) / 2.0,
            (self.top + self.bottom) / 2.0,
        )
    }

    fn offset(&mut self, dx: f32, dy: f32) {
        self.left += dx;
        self.right += dx;
        self.top += dy;
        self.bottom += dy;
    }
}

/// Compute the buffer-to-view transform for a display rotation.
///
/// 0° and 180° need no correction and yield the identity. For 90° and 270°
/// the view is mapped onto the transposed buffer rectangle centred in the
/// view, scaled up so the buffer covers the view, and turned back by a
/// quarter turn. Degenerate (zero) sizes yield the identity.
pub fn compute_transform(rotation: Rotation, view: Size, preview: Size) -> AffineTransform {
    if !rotation.swaps_dimensions() || view.is_empty() || preview.is_empty() {
        return AffineTransform::IDENTITY;
    }

    let view_w = view.width as f32;
    let view_h = view.height as f32;
    let preview_w = preview.width as f32;
    let preview_h = preview.height as f32;

    let view_rect = Rect::from_size(view_w, view_h);
    // The sensor buffer is landscape; transposed to match the rotated view
    let mut buffer_rect = Rect::from_size(preview_h, preview_w);
    let (center_x, center_y) = view_rect.center();
    let (buffer_x, buffer_y) = buffer_rect.center();
    buffer_rect.offset(center_x - buffer_x, center_y - buffer_y);

    let scale = (view_h / preview_h).max(view_w / preview_w);
    let degrees = 90 * (rotation.unit() - 2);

    AffineTransform::rect_to_rect(&view_rect, &buffer_rect)
        .then(&AffineTransform::scale_about(scale, center_x, center_y))
        .then(&AffineTransform::rotate_about(degrees, center_x, center_y))
}
