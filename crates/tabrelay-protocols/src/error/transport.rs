//! Transport errors.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("Outbound queue full")]
    QueueFull,

    #[error("Transport failure: {0}")]
    Other(String),
}
