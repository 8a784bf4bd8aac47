// SPDX-License-Identifier: GPL-3.0-only

//! In-process camera service
//!
//! Behaves like an asynchronous capture driver without touching hardware:
//! open and session requests complete through callbacks, either right away
//! (`Delivery::Immediate`) or when the owner releases them
//! (`Delivery::Deferred`), which makes every callback interleaving
//! reproducible. Every call is journaled and misuse of the device contract
//! (two live sessions, requests against closed sessions, double closes) is
//! recorded as a violation instead of being silently accepted.
//!
//! A newer session request on a device supersedes any older one still in
//! flight: the older request completes with `ConfigureFailed`.

use super::CameraService;
use super::types::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// When callbacks are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delivery {
    /// Callbacks fire before the request call returns
    #[default]
    Immediate,
    /// Callbacks queue up until `deliver_next`/`deliver_all`
    Deferred,
}

/// Journal entry for every request made to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Open(DeviceId),
    CloseDevice(HandleId),
    CreateRequest {
        handle: HandleId,
        kind: RequestKind,
        targets: Vec<SurfaceId>,
    },
    CreateSession {
        handle: HandleId,
        targets: Vec<SurfaceId>,
    },
    SetRepeating {
        session: SessionId,
        kind: RequestKind,
        control_mode: ControlMode,
    },
    CloseSession(SessionId),
}

enum PendingCallback {
    Open {
        device: DeviceId,
        callback: DeviceCallback,
    },
    Device {
        callback: DeviceCallback,
        event: DeviceEvent,
    },
    Session {
        handle: HandleId,
        targets: Vec<SurfaceId>,
        generation: u64,
        fail: bool,
        callback: SessionCallback,
    },
}

struct VirtualState {
    devices: Vec<(DeviceId, DeviceCapabilities)>,
    delivery: Delivery,
    pending: VecDeque<PendingCallback>,
    calls: Vec<ServiceCall>,
    open_devices: HashMap<HandleId, DeviceCallback>,
    live_sessions: HashMap<SessionId, HandleId>,
    session_generation: HashMap<HandleId, u64>,
    next_id: u64,
    fail_next_open: Option<BackendError>,
    fail_next_session: bool,
    fail_next_repeating: Option<BackendError>,
    violations: Vec<String>,
}

impl VirtualState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn violation(&mut self, message: String) {
        warn!(violation = %message, "Virtual camera contract violation");
        self.violations.push(message);
    }
}

/// Simulated asynchronous camera service
pub struct VirtualCameraService {
    state: Mutex<VirtualState>,
}

impl VirtualCameraService {
    /// Service with a back camera and a front camera
    pub fn new() -> Self {
        Self::with_devices(vec![
            (
                DeviceId::new("0"),
                DeviceCapabilities {
                    record_sizes: vec![Size::new(1920, 1080), Size::new(1280, 720)],
                    preview_sizes: vec![
                        Size::new(1920, 1080),
                        Size::new(1280, 720),
                        Size::new(640, 480),
                    ],
                },
            ),
            (
                DeviceId::new("1"),
                DeviceCapabilities {
                    record_sizes: vec![Size::new(1280, 720), Size::new(640, 480)],
                    preview_sizes: vec![Size::new(1280, 720), Size::new(640, 480)],
                },
            ),
        ])
    }

    pub fn with_devices(devices: Vec<(DeviceId, DeviceCapabilities)>) -> Self {
        Self {
            state: Mutex::new(VirtualState {
                devices,
                delivery: Delivery::Immediate,
                pending: VecDeque::new(),
                calls: Vec::new(),
                open_devices: HashMap::new(),
                live_sessions: HashMap::new(),
                session_generation: HashMap::new(),
                next_id: 0,
                fail_next_open: None,
                fail_next_session: false,
                fail_next_repeating: None,
                violations: Vec::new(),
            }),
        }
    }

    /// Switch to deferred delivery (builder form)
    pub fn deferred(self) -> Self {
        self.set_delivery(Delivery::Deferred);
        self
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_delivery(&self, delivery: Delivery) {
        self.lock().delivery = delivery;
    }

    /// Make the next `open` call fail synchronously
    pub fn fail_next_open(&self, error: BackendError) {
        self.lock().fail_next_open = Some(error);
    }

    /// Make the next session creation report `ConfigureFailed`
    pub fn fail_next_session(&self) {
        self.lock().fail_next_session = true;
    }

    /// Make the next `set_repeating_request` call fail
    pub fn fail_next_repeating(&self, error: BackendError) {
        self.lock().fail_next_repeating = Some(error);
    }

    /// Journal of every request, in call order
    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Contract violations observed so far
    pub fn violations(&self) -> Vec<String> {
        self.lock().violations.clone()
    }

    pub fn live_session_count(&self) -> usize {
        self.lock().live_sessions.len()
    }

    pub fn open_device_count(&self) -> usize {
        self.lock().open_devices.len()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Simulate the hardware dropping every open device
    pub fn disconnect_all(&self) {
        let callbacks: Vec<DeviceCallback> = {
            let state = self.lock();
            state.open_devices.values().cloned().collect()
        };
        for callback in callbacks {
            self.enqueue(PendingCallback::Device {
                callback,
                event: DeviceEvent::Disconnected,
            });
        }
    }

    /// Simulate a device error on every open device
    pub fn error_all(&self, code: i32) {
        let callbacks: Vec<DeviceCallback> = {
            let state = self.lock();
            state.open_devices.values().cloned().collect()
        };
        for callback in callbacks {
            self.enqueue(PendingCallback::Device {
                callback,
                event: DeviceEvent::Error(code),
            });
        }
    }

    /// Deliver the oldest pending callback; false if none was pending
    pub fn deliver_next(&self) -> bool {
        let Some(pending) = self.lock().pending.pop_front() else {
            return false;
        };
        self.fire(pending);
        true
    }

    /// Deliver pending callbacks until none remain, including ones queued
    /// while delivering. Returns how many were delivered.
    pub fn deliver_all(&self) -> usize {
        let mut delivered = 0;
        while self.deliver_next() {
            delivered += 1;
        }
        delivered
    }

    fn enqueue(&self, pending: PendingCallback) {
        let immediate = {
            let mut state = self.lock();
            state.pending.push_back(pending);
            state.delivery == Delivery::Immediate
        };
        if immediate {
            self.deliver_all();
        }
    }

    /// Resolve a pending callback against current service state and invoke it
    /// outside the lock
    fn fire(&self, pending: PendingCallback) {
        match pending {
            PendingCallback::Open { device, callback } => {
                let handle = {
                    let mut state = self.lock();
                    let id = HandleId(state.next_id());
                    state.open_devices.insert(id, callback.clone());
                    DeviceHandle { id, device }
                };
                debug!(handle = ?handle.id, "Virtual device opened");
                callback(DeviceEvent::Opened(handle));
            }
            PendingCallback::Device { callback, event } => callback(event),
            PendingCallback::Session {
                handle,
                targets,
                generation,
                fail,
                callback,
            } => {
                let outcome = {
                    let mut state = self.lock();
                    let superseded = state.session_generation.get(&handle) != Some(&generation);
                    if fail || superseded || !state.open_devices.contains_key(&handle) {
                        None
                    } else {
                        let already_live = state
                            .live_sessions
                            .values()
                            .filter(|owner| **owner == handle)
                            .count();
                        if already_live > 0 {
                            state.violation(format!(
                                "session configured on {:?} while {} other session(s) live",
                                handle, already_live
                            ));
                        }
                        let id = SessionId(state.next_id());
                        state.live_sessions.insert(id, handle);
                        Some(CaptureSession {
                            id,
                            device: handle,
                            targets,
                        })
                    }
                };
                match outcome {
                    Some(session) => {
                        debug!(session = ?session.id, "Virtual session configured");
                        callback(SessionEvent::Configured(session));
                    }
                    None => callback(SessionEvent::ConfigureFailed),
                }
            }
        }
    }
}

impl Default for VirtualCameraService {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraService for VirtualCameraService {
    fn enumerate_devices(&self) -> BackendResult<Vec<DeviceId>> {
        Ok(self.lock().devices.iter().map(|(id, _)| id.clone()).collect())
    }

    fn capabilities(&self, device: &DeviceId) -> BackendResult<DeviceCapabilities> {
        self.lock()
            .devices
            .iter()
            .find(|(id, _)| id == device)
            .map(|(_, caps)| caps.clone())
            .ok_or_else(|| BackendError::DeviceNotFound(device.to_string()))
    }

    fn open(&self, device: &DeviceId, callback: DeviceCallback) -> BackendResult<()> {
        {
            let mut state = self.lock();
            state.calls.push(ServiceCall::Open(device.clone()));
            if let Some(error) = state.fail_next_open.take() {
                return Err(error);
            }
            if !state.devices.iter().any(|(id, _)| id == device) {
                return Err(BackendError::DeviceNotFound(device.to_string()));
            }
        }
        self.enqueue(PendingCallback::Open {
            device: device.clone(),
            callback,
        });
        Ok(())
    }

    fn close_device(&self, handle: DeviceHandle) {
        let mut state = self.lock();
        state.calls.push(ServiceCall::CloseDevice(handle.id));
        if state.open_devices.remove(&handle.id).is_none() {
            state.violation(format!("close of device {:?} that is not open", handle.id));
        }
        // Closing a device tears down its sessions
        state.live_sessions.retain(|_, owner| *owner != handle.id);
        state.session_generation.remove(&handle.id);
    }

    fn create_request(
        &self,
        handle: &DeviceHandle,
        kind: RequestKind,
        targets: &[Surface],
    ) -> BackendResult<CaptureRequest> {
        let mut state = self.lock();
        state.calls.push(ServiceCall::CreateRequest {
            handle: handle.id,
            kind,
            targets: targets.iter().map(|s| s.id).collect(),
        });
        if !state.open_devices.contains_key(&handle.id) {
            state.violation(format!("request template on closed device {:?}", handle.id));
            return Err(BackendError::DeviceClosed(format!("{:?}", handle.id)));
        }
        Ok(CaptureRequest::new(kind, targets))
    }

    fn create_session(
        &self,
        handle: &DeviceHandle,
        targets: &[Surface],
        callback: SessionCallback,
    ) -> BackendResult<()> {
        let (generation, fail) = {
            let mut state = self.lock();
            state.calls.push(ServiceCall::CreateSession {
                handle: handle.id,
                targets: targets.iter().map(|s| s.id).collect(),
            });
            if !state.open_devices.contains_key(&handle.id) {
                state.violation(format!("session requested on closed device {:?}", handle.id));
                return Err(BackendError::DeviceClosed(format!("{:?}", handle.id)));
            }
            let live = state
                .live_sessions
                .values()
                .filter(|owner| **owner == handle.id)
                .count();
            if live > 0 {
                state.violation(format!(
                    "session requested on {:?} while {} session(s) still live",
                    handle.id, live
                ));
            }
            let generation = state.next_id();
            state.session_generation.insert(handle.id, generation);
            (generation, std::mem::take(&mut state.fail_next_session))
        };
        self.enqueue(PendingCallback::Session {
            handle: handle.id,
            targets: targets.iter().map(|s| s.id).collect(),
            generation,
            fail,
            callback,
        });
        Ok(())
    }

    fn set_repeating_request(
        &self,
        session: &CaptureSession,
        request: &CaptureRequest,
    ) -> BackendResult<()> {
        let mut state = self.lock();
        state.calls.push(ServiceCall::SetRepeating {
            session: session.id,
            kind: request.kind,
            control_mode: request.control_mode,
        });
        if !state.live_sessions.contains_key(&session.id) {
            state.violation(format!("repeating request on closed session {:?}", session.id));
            return Err(BackendError::SessionClosed(format!("{:?}", session.id)));
        }
        if let Some(error) = state.fail_next_repeating.take() {
            return Err(error);
        }
        Ok(())
    }

    fn close_session(&self, session: CaptureSession) {
        let mut state = self.lock();
        state.calls.push(ServiceCall::CloseSession(session.id));
        if state.live_sessions.remove(&session.id).is_none() {
            state.violation(format!("close of session {:?} that is not live", session.id));
        }
    }
}
