// SPDX-License-Identifier: GPL-3.0-only

//! Preview texture owned by the view

use crate::backends::camera::types::{Size, Surface, SurfaceId, SurfaceKind};

/// Texture the preview is rendered into
///
/// Each session binds a fresh surface wrapping the texture. The texture's
/// buffer size is set right before the surface is created so the buffer
/// always matches the selected preview size.
#[derive(Debug, Default)]
pub struct PreviewTexture {
    buffer_size: Option<Size>,
}

impl PreviewTexture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_size(&self) -> Option<Size> {
        self.buffer_size
    }

    pub fn set_default_buffer_size(&mut self, size: Size) {
        self.buffer_size = Some(size);
    }

    /// Resize the buffer to `size` and wrap it in a new surface
    pub fn create_surface(&mut self, size: Size) -> Surface {
        self.set_default_buffer_size(size);
        Surface {
            id: SurfaceId::next(),
            kind: SurfaceKind::Preview,
            size,
        }
    }
}
