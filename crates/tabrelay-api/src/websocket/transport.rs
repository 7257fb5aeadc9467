//! Adapter from an extension socket to the relay's transport contract.

use tabrelay_protocols::{TransportError, TransportHandle};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Write side of one extension socket.
///
/// Frames go through a bounded queue drained by the socket's writer task,
/// so `send` never blocks the caller. `close` asks the writer to send a
/// close frame and stop.
#[derive(Debug, Clone)]
pub struct WsTransport {
    tx: mpsc::Sender<String>,
    closed: CancellationToken,
}

impl WsTransport {
    /// Create the transport and the receiving end its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = CancellationToken::new();
        (
            Self {
                tx,
                closed: closed.clone(),
            },
            rx,
            closed,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled() || self.tx.is_closed()
    }
}

impl TransportHandle for WsTransport {
    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.tx.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => TransportError::QueueFull,
            TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_writer() {
        let (transport, mut rx, _) = WsTransport::channel(4);
        transport.send("a".to_string()).unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("a"));
    }

    #[test]
    fn test_full_queue_is_reported() {
        let (transport, _rx, _) = WsTransport::channel(1);
        transport.send("a".to_string()).unwrap();
        assert!(matches!(
            transport.send("b".to_string()),
            Err(TransportError::QueueFull)
        ));
    }

    #[test]
    fn test_close_cancels_and_rejects_sends() {
        let (transport, _rx, token) = WsTransport::channel(4);
        transport.close();
        assert!(token.is_cancelled());
        assert!(transport.is_closed());
        assert!(matches!(
            transport.send("a".to_string()),
            Err(TransportError::Closed)
        ));
    }

    #[test]
    fn test_dropped_writer_means_closed() {
        let (transport, rx, _) = WsTransport::channel(4);
        drop(rx);
        assert!(matches!(
            transport.send("a".to_string()),
            Err(TransportError::Closed)
        ));
    }
}
