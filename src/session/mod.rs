// SPDX-License-Identifier: GPL-3.0-only

//! Camera session control
//!
//! - [`state`]: the tagged session state and its tokens
//! - [`event`]: events in, commands and notices out
//! - [`machine`]: the pure transition function
//! - [`controller`]: executes commands, routes hardware callbacks and exposes
//!   the UI-facing API
//!
//! Only one capture session is ever live per device. Switching between
//! preview and recording closes the current session before the next one is
//! requested, and every hardware callback is checked against the token of
//! the request it answers before it may change anything.

pub mod controller;
pub mod event;
pub mod machine;
pub mod preview;
pub mod state;

pub use controller::SessionController;
pub use event::{Command, Event, Notice, Targets};
pub use machine::{SelectionPolicy, SessionMachine};
pub use preview::PreviewTexture;
pub use state::{DeviceToken, SelectedSizes, SessionPhase, SessionState, SessionToken};
