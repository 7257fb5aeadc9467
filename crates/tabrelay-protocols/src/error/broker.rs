//! Caller-facing broker errors.

use std::time::Duration;

use thiserror::Error;

use crate::ids::ConnectionId;
use crate::transport::CloseReason;

/// Failure of a single `execute` call.
///
/// Every variant names the operation and, where one was chosen, the target
/// connection, so a failure can be diagnosed without reading logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    /// Nothing to connect to: no extension has completed its handshake.
    #[error("No active browser extension connection for operation '{operation}'")]
    NoActiveConnection { operation: String },

    /// The target went away after the request was sent.
    #[error("Connection {connection} closed ({reason}) while '{operation}' was pending after {}ms", .elapsed.as_millis())]
    ConnectionClosed {
        operation: String,
        connection: ConnectionId,
        reason: CloseReason,
        elapsed: Duration,
    },

    /// No reply and no closure before the deadline.
    #[error("Operation '{operation}' on {connection} timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        operation: String,
        connection: ConnectionId,
        elapsed: Duration,
    },

    /// The request or its reply could not be encoded or interpreted.
    #[error("Malformed message for operation '{operation}': {detail}")]
    MalformedMessage { operation: String, detail: String },

    /// The extension ran the operation and reported a failure.
    #[error("Operation '{operation}' failed on {connection}: {kind}: {message}")]
    OperationFailed {
        operation: String,
        connection: ConnectionId,
        kind: String,
        message: String,
    },
}

impl BrokerError {
    /// Short machine-readable kind, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoActiveConnection { .. } => "NoActiveConnection",
            Self::ConnectionClosed { .. } => "ConnectionClosed",
            Self::Timeout { .. } => "Timeout",
            Self::MalformedMessage { .. } => "MalformedMessage",
            Self::OperationFailed { .. } => "OperationFailed",
        }
    }

    pub fn operation(&self) -> &str {
        match self {
            Self::NoActiveConnection { operation }
            | Self::ConnectionClosed { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::MalformedMessage { operation, .. }
            | Self::OperationFailed { operation, .. } => operation,
        }
    }
}
