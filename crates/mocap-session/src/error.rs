use mocap_core::IoError;
use serde::{Deserialize, Serialize};

use crate::link::LinkError;
use crate::session::SessionState;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("{host}: expected prompt {expected:?}, received {received:?}")]
    HandshakeMismatch {
        host: String,
        expected: String,
        received: String,
    },
    #[error("{host}: malformed telemetry line {line:?}")]
    TelemetryParse { host: String, line: String },
    #[error("{host}: result transfer failed: {reason}")]
    TransferFailure { host: String, reason: String },
    #[error("{host}: link closed while waiting for {expecting:?}")]
    Disconnected { host: String, expecting: String },
    #[error("{host}: timed out waiting for {expecting:?}")]
    Timeout { host: String, expecting: String },
    #[error("{host}: cancelled")]
    Cancelled { host: String },
    #[error("{host}: link failure")]
    Link {
        host: String,
        #[source]
        source: LinkError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition { from: SessionState, to: SessionState },
    #[error("{available} node(s) produced results, {required} required")]
    NotEnoughResults { available: usize, required: usize },
}

/// Tag of the error that failed a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    HandshakeMismatch,
    TelemetryParse,
    TransferFailure,
    Disconnected,
    Timeout,
    Cancelled,
    Link,
    Io,
    InvalidTransition,
    NotEnoughResults,
}

impl SessionError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SessionError::HandshakeMismatch { .. } => FailureKind::HandshakeMismatch,
            SessionError::TelemetryParse { .. } => FailureKind::TelemetryParse,
            SessionError::TransferFailure { .. } => FailureKind::TransferFailure,
            SessionError::Disconnected { .. } => FailureKind::Disconnected,
            SessionError::Timeout { .. } => FailureKind::Timeout,
            SessionError::Cancelled { .. } => FailureKind::Cancelled,
            SessionError::Link { .. } => FailureKind::Link,
            SessionError::Io(_) | SessionError::Json(_) => FailureKind::Io,
            SessionError::InvalidTransition { .. } => FailureKind::InvalidTransition,
            SessionError::NotEnoughResults { .. } => FailureKind::NotEnoughResults,
        }
    }

    /// Host the error originated from, if it is node-specific.
    pub fn host(&self) -> Option<&str> {
        match self {
            SessionError::HandshakeMismatch { host, .. }
            | SessionError::TelemetryParse { host, .. }
            | SessionError::TransferFailure { host, .. }
            | SessionError::Disconnected { host, .. }
            | SessionError::Timeout { host, .. }
            | SessionError::Cancelled { host }
            | SessionError::Link { host, .. } => Some(host),
            _ => None,
        }
    }
}

impl From<IoError> for SessionError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::Io(e) => SessionError::Io(e),
            IoError::Json(e) => SessionError::Json(e),
        }
    }
}
