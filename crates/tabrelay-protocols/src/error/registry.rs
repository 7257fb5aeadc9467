//! Connection registry errors.

use thiserror::Error;

use crate::error::TransportError;
use crate::ids::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The id is not registered, or not in the state the operation needs.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    /// The transport refused the frame.
    #[error("Send to {id} failed: {source}")]
    Send {
        id: ConnectionId,
        #[source]
        source: TransportError,
    },
}
