// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for the camera hardware boundary

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A resolution in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count, widened so 8K sizes cannot overflow
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True if both sizes describe the same aspect ratio (exact integer cross-multiply)
    pub fn same_aspect(&self, other: &Size) -> bool {
        self.width as u64 * other.height as u64 == self.height as u64 * other.width as u64
    }

    /// The same size with the longer edge as width.
    ///
    /// Sensor output sizes are reported landscape, so a portrait view is
    /// compared against them with its edges swapped.
    pub fn landscape(&self) -> Self {
        if self.height > self.width {
            Self::new(self.height, self.width)
        } else {
            *self
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Aspect ratio expressed as a reduced or unreduced integer pair (16:9, 4:3, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const WIDESCREEN: AspectRatio = AspectRatio::new(16, 9);
    pub const STANDARD: AspectRatio = AspectRatio::new(4, 3);

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Check whether a size has exactly this aspect ratio
    pub fn matches(&self, size: &Size) -> bool {
        size.same_aspect(&Size::new(self.width, self.height))
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::WIDESCREEN
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Display rotation in quarter turns, as reported by the windowing system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Rotate0,
    /// 90 degrees clockwise
    Rotate90,
    /// 180 degrees (upside down)
    Rotate180,
    /// 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Create rotation from a discrete rotation unit (0..=3, normalised)
    pub fn from_unit(unit: i32) -> Self {
        match unit.rem_euclid(4) {
            1 => Rotation::Rotate90,
            2 => Rotation::Rotate180,
            3 => Rotation::Rotate270,
            _ => Rotation::Rotate0,
        }
    }

    /// Create rotation from an integer degree value (normalised to 0-360).
    /// Values that are not a multiple of 90 map to no rotation.
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Rotation::Rotate90,
            180 => Rotation::Rotate180,
            270 => Rotation::Rotate270,
            _ => Rotation::Rotate0,
        }
    }

    /// The discrete rotation unit (0=0°, 1=90°, 2=180°, 3=270°)
    pub fn unit(&self) -> i32 {
        match self {
            Rotation::Rotate0 => 0,
            Rotation::Rotate90 => 1,
            Rotation::Rotate180 => 2,
            Rotation::Rotate270 => 3,
        }
    }

    pub fn degrees(&self) -> u32 {
        self.unit() as u32 * 90
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Identifier of a camera device as enumerated by the service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Output sizes a device supports, per target use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Sizes usable for a preview surface, in device-reported order
    pub preview_sizes: Vec<Size>,
    /// Sizes usable for a recorder surface, in device-reported order
    pub record_sizes: Vec<Size>,
}

/// Service-assigned identifier of an opened device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

/// Service-assigned identifier of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

/// Identifier of an output surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

impl SurfaceId {
    /// Allocate a process-unique surface id.
    ///
    /// Preview textures and sinks create surfaces independently, so ids come
    /// from one shared counter.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Live reference to an opened camera.
///
/// Not `Clone`: whoever holds the value is the one responsible for closing it.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: HandleId,
    pub device: DeviceId,
}

/// One negotiated binding of output targets to a device
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureSession {
    pub id: SessionId,
    pub device: HandleId,
    pub targets: Vec<SurfaceId>,
}

/// What a surface feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    /// The on-screen preview texture
    Preview,
    /// The recording sink's input
    Recorder,
}

/// An output target that can be bound into a capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: SurfaceId,
    pub kind: SurfaceKind,
    /// Buffer size the surface was created with
    pub size: Size,
}

/// Capture request template kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Preview,
    Record,
}

/// 3A control mode carried by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlMode {
    /// Template default, 3A not explicitly requested
    #[default]
    Default,
    /// Normal auto-exposure/focus/white-balance
    Auto,
}

/// A capture instruction bound to a set of targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub kind: RequestKind,
    pub targets: Vec<SurfaceId>,
    pub control_mode: ControlMode,
}

impl CaptureRequest {
    pub fn new(kind: RequestKind, targets: &[Surface]) -> Self {
        Self {
            kind,
            targets: targets.iter().map(|s| s.id).collect(),
            control_mode: ControlMode::Default,
        }
    }

    pub fn with_control_mode(mut self, mode: ControlMode) -> Self {
        self.control_mode = mode;
        self
    }
}

/// Callback events for a device open request
#[derive(Debug)]
pub enum DeviceEvent {
    Opened(DeviceHandle),
    Disconnected,
    Error(i32),
}

/// Callback events for a session creation request
#[derive(Debug)]
pub enum SessionEvent {
    Configured(CaptureSession),
    ConfigureFailed,
}

/// Device callback, may fire more than once (opened, then disconnected)
pub type DeviceCallback = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

/// Session callback, fires exactly once
pub type SessionCallback = Box<dyn FnOnce(SessionEvent) + Send>;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Camera device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),
    /// Device is in use or access was refused
    #[error("Camera access error: {0}")]
    Access(String),
    /// The referenced device has been closed or disconnected
    #[error("Device closed: {0}")]
    DeviceClosed(String),
    /// The referenced session has been closed
    #[error("Session closed: {0}")]
    SessionClosed(String),
    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_matching() {
        assert!(AspectRatio::WIDESCREEN.matches(&Size::new(1920, 1080)));
        assert!(AspectRatio::WIDESCREEN.matches(&Size::new(1280, 720)));
        assert!(!AspectRatio::WIDESCREEN.matches(&Size::new(640, 480)));
        assert!(AspectRatio::STANDARD.matches(&Size::new(640, 480)));
    }

    #[test]
    fn test_landscape() {
        assert_eq!(Size::new(1080, 1920).landscape(), Size::new(1920, 1080));
        assert_eq!(Size::new(1920, 1080).landscape(), Size::new(1920, 1080));
    }

    #[test]
    fn test_rotation_units() {
        assert_eq!(Rotation::from_unit(1), Rotation::Rotate90);
        assert_eq!(Rotation::from_unit(-1), Rotation::Rotate270);
        assert_eq!(Rotation::from_unit(4), Rotation::Rotate0);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Rotate270);
        assert_eq!(Rotation::from_degrees(45), Rotation::Rotate0);
        assert!(Rotation::Rotate270.swaps_dimensions());
        assert!(!Rotation::Rotate180.swaps_dimensions());
    }
}
