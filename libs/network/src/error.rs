//! Network error types.
//!
//! The taxonomy separates connection-fatal protocol violations from locally
//! recoverable conditions: a missing transport backs the pump off, a timeout
//! surfaces through the caller's future, a resumption mismatch downgrades to
//! a fresh connection. None of those tear a session down.

use fairway_codec::CodecError;
use fairway_types::ConnectionId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    /// No transport is currently attached; envelopes stay buffered.
    #[error("no transport attached")]
    TransportUnavailable,

    /// The attached transport failed or was closed underneath us.
    #[error("transport closed: {reason}")]
    TransportClosed { reason: String },

    /// Malformed frame or control-field violation. Connection-fatal.
    #[error("protocol violation: {0}")]
    Protocol(#[from] CodecError),

    /// Presented resumption token does not match any known connection.
    /// Callers treat the peer as new, never as an error to the peer.
    #[error("unknown resumption token {presented}")]
    ResumptionMismatch { presented: ConnectionId },

    /// A pending reply did not arrive within the caller's deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The logical session was closed; no further traffic is possible.
    #[error("session closed")]
    SessionClosed,
}

impl NetworkError {
    pub fn transport_closed(reason: impl std::fmt::Display) -> Self {
        Self::TransportClosed {
            reason: reason.to_string(),
        }
    }

    pub fn timeout(timeout: std::time::Duration) -> Self {
        Self::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

pub type Result<T> = std::result::Result<T, NetworkError>;
