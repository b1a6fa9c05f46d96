//! Error types for the request engine.
//!
//! Every failure of a logical request surfaces as an [`EngineError`]. The
//! transient-status case never appears here on its own: the engine retries it
//! internally and only reports [`EngineError::Status`] once retries are
//! exhausted.

use sparky_core::ValidationError;
use thiserror::Error;

use crate::scheduler::LaneKind;

/// A specialized Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A failed HTTP exchange that produced no response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The exchange exceeded its timeout.
    #[error("request timeout")]
    Timeout,

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    Request(String),

    /// The response body could not be read.
    #[error("failed to read response: {0}")]
    Body(String),
}

/// Errors returned by a logical request.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request was rejected before any I/O.
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The network exchange failed; not retried by the engine.
    #[error("{method} request to {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    /// The server answered with a non-retryable status, or retries ran out.
    #[error("received error {status} for a {method} request to {url}")]
    Status {
        status: u16,
        method: String,
        url: String,
    },

    /// The call was evicted from a full lane backlog.
    #[error("{method} request to {url} dropped from the {lane} lane backlog")]
    Dropped {
        lane: LaneKind,
        method: String,
        url: String,
    },

    /// The caller gave up on the request.
    #[error("request cancelled")]
    Cancelled,

    /// A success status came with a body or headers that could not be used.
    #[error("invalid response to {method} request to {url}: {message}")]
    InvalidResponse {
        method: String,
        url: String,
        message: String,
    },
}

impl EngineError {
    /// Creates a transport error.
    pub fn transport(method: impl Into<String>, url: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            method: method.into(),
            url: url.into(),
            source,
        }
    }

    /// Creates a fatal status error.
    pub fn status(status: u16, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Status {
            status,
            method: method.into(),
            url: url.into(),
        }
    }

    /// Creates a dropped error.
    pub fn dropped(lane: LaneKind, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Dropped {
            lane,
            method: method.into(),
            url: url.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(
        method: impl Into<String>,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidResponse {
            method: method.into(),
            url: url.into(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status for status errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the call was evicted from a lane.
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Dropped { .. })
    }

    /// Returns true if the caller cancelled the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the request never left the process.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
