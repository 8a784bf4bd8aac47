// SPDX-License-Identifier: MPL-2.0

//! Error types for the camera session

use crate::backends::camera::{BackendError, ExecutorError};
use crate::pipelines::video::SinkError;
use crate::session::SessionPhase;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Session controller errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Storage/filesystem errors
    #[error("Storage error: {0}")]
    Storage(String),
    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Session controller errors
///
/// Usage faults leave the session untouched. Hardware and sink faults are
/// reported after the controller has already recovered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    // ===== Usage =====
    /// Operation not allowed in the current phase
    #[error("cannot {operation} while {phase}")]
    InvalidState {
        operation: &'static str,
        phase: SessionPhase,
    },
    /// No device is open
    #[error("camera is not open")]
    CameraNotOpen,
    /// The view has not reported a size yet
    #[error("preview view is not ready")]
    ViewNotReady,
    #[error("recording already in progress")]
    AlreadyRecording,
    #[error("not recording")]
    NotRecording,
    /// Hardware callbacks cannot be delivered while the executor is stopped
    #[error("background executor is not running")]
    ExecutorNotRunning,

    // ===== Resources =====
    /// Device reported no usable output size
    #[error("no supported {0} size")]
    NoSupportedSize(&'static str),
    /// Output path could not be prepared
    #[error("cannot prepare output file: {0}")]
    Storage(String),

    // ===== Collaborators =====
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No per-user configuration directory on this platform
    #[error("no configuration directory available")]
    NoConfigDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_message() {
        let err = SessionError::InvalidState {
            operation: "start recording",
            phase: SessionPhase::Opening,
        };
        assert_eq!(err.to_string(), "cannot start recording while opening");
    }

    #[test]
    fn test_conversions_into_app_error() {
        let err: AppError = SessionError::NotRecording.into();
        assert_eq!(err.to_string(), "Session error: not recording");

        let err: AppError = "boom".into();
        assert!(matches!(err, AppError::Other(_)));
    }
}
