//! The contract the core needs from a live extension connection.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Write side of one persistent extension connection.
///
/// Implementations enqueue the frame and return immediately; a connection
/// that is no longer open must report [`TransportError::Closed`] rather than
/// dropping the frame silently.
pub trait TransportHandle: Send + Sync {
    /// Queue a text frame for delivery.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Ask the transport to shut the connection down.
    fn close(&self);
}

/// Why a connection left the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum CloseReason {
    /// The extension closed the socket.
    ClientClosed,
    /// The socket failed.
    TransportError(String),
    /// No inbound traffic within the liveness threshold.
    HeartbeatTimeout,
    /// Closed after in-flight operations finished.
    Drained,
    /// The relay is shutting down.
    Shutdown,
    /// A frame could not be handed to the transport.
    SendFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientClosed => f.write_str("closed by client"),
            Self::TransportError(e) => write!(f, "transport error: {}", e),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::Drained => f.write_str("drained"),
            Self::Shutdown => f.write_str("relay shutdown"),
            Self::SendFailed => f.write_str("send failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_reason_display() {
        assert_eq!(CloseReason::HeartbeatTimeout.to_string(), "heartbeat timeout");
        assert!(CloseReason::TransportError("reset".into()).to_string().contains("reset"));
    }

    #[test]
    fn test_close_reason_serialization() {
        let json = serde_json::to_string(&CloseReason::TransportError("reset".into())).unwrap();
        assert_eq!(json, r#"{"kind":"transport-error","detail":"reset"}"#);
        let json = serde_json::to_string(&CloseReason::Drained).unwrap();
        assert_eq!(json, r#"{"kind":"drained"}"#);
    }
}
