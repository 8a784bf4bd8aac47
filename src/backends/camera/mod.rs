// SPDX-License-Identifier: MPL-2.0

//! Camera hardware boundary
//!
//! The capture hardware is an asynchronous service: requests return
//! immediately and their outcome arrives later through a callback, on
//! whatever thread the service chooses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │   UI Layer (App)    │
//! └──────────┬──────────┘
//!            │ intents
//!            ▼
//! ┌─────────────────────┐      callbacks     ┌────────────────────┐
//! │  SessionController  │ ◀───────────────── │ BackgroundExecutor │
//! └──────────┬──────────┘                    └─────────▲──────────┘
//!            │ open / configure / close                │
//!            ▼                                         │
//! ┌─────────────────────┐                              │
//! │ CameraService Trait │ ─────────────────────────────┘
//! └──────────┬──────────┘
//!            ▼
//!   ┌──────────────────┐
//!   │ Virtual / driver │
//!   └──────────────────┘
//! ```

pub mod executor;
pub mod types;
pub mod virtual_device;

pub use executor::{BackgroundExecutor, ExecutorError};
pub use types::*;
pub use virtual_device::{ServiceCall, VirtualCameraService};

/// Asynchronous camera device service
///
/// Implementations deliver callback events from any thread; receivers must
/// not assume they run on the thread that issued the request.
pub trait CameraService: Send + Sync {
    // ===== Enumeration =====

    /// Enumerate available devices in service order
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceId>>;

    /// Get the output sizes supported by a device
    fn capabilities(&self, device: &DeviceId) -> BackendResult<DeviceCapabilities>;

    // ===== Device =====

    /// Request that a device be opened
    ///
    /// The outcome arrives through `callback`: `Opened(handle)` on success,
    /// then possibly `Disconnected` or `Error` at any later time.
    fn open(&self, device: &DeviceId, callback: DeviceCallback) -> BackendResult<()>;

    /// Close an opened device, implicitly closing its sessions
    fn close_device(&self, handle: DeviceHandle);

    /// Build a request template of the given kind targeting `targets`
    fn create_request(
        &self,
        handle: &DeviceHandle,
        kind: RequestKind,
        targets: &[Surface],
    ) -> BackendResult<CaptureRequest>;

    // ===== Sessions =====

    /// Request a new capture session binding `targets` to the device
    ///
    /// The outcome arrives through `callback`, exactly once.
    fn create_session(
        &self,
        handle: &DeviceHandle,
        targets: &[Surface],
        callback: SessionCallback,
    ) -> BackendResult<()>;

    /// Start (or replace) the repeating request of a live session
    fn set_repeating_request(
        &self,
        session: &CaptureSession,
        request: &CaptureRequest,
    ) -> BackendResult<()>;

    /// Close a session
    fn close_session(&self, session: CaptureSession);
}
