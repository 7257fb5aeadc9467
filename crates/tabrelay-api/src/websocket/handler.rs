//! WebSocket handler implementation.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tabrelay_protocols::CloseReason;
use tracing::{debug, info, warn};

use crate::state::AppState;

use super::transport::WsTransport;

/// How long the writer gets to flush a close frame after the reader ends.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// WebSocket upgrade handler for browser extensions.
pub async fn extension_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let relay = state.relay.clone();
    let (mut sender, mut receiver) = socket.split();
    let (transport, mut rx, closed) = WsTransport::channel(state.outbound_queue);

    let connection_id = relay.accept(Arc::new(transport));
    info!(connection = %connection_id, "Extension connected");

    // Writer: drain the outbound queue until the relay closes us or the
    // socket stops accepting frames.
    let writer_closed = closed.clone();
    let mut sender_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => {
                    let Some(text) = msg else { break };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                _ = writer_closed.cancelled() => {
                    while let Ok(text) = rx.try_recv() {
                        if sender.send(Message::Text(text.into())).await.is_err() {
                            return;
                        }
                    }
                    break;
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    });

    let reason = loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break None,
            frame = receiver.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                debug!(connection = %connection_id, bytes = text.len(), "Frame received");
                relay.on_message(connection_id, text.as_str());
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(connection = %connection_id, "Ignoring binary frame");
                relay.on_traffic(connection_id);
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                relay.on_traffic(connection_id);
            }
            Some(Ok(Message::Close(_))) | None => break Some(CloseReason::ClientClosed),
            Some(Err(e)) => {
                warn!(connection = %connection_id, error = %e, "WebSocket error");
                break Some(CloseReason::TransportError(e.to_string()));
            }
        }
    };

    // `None` means the relay closed the connection itself and already
    // reported why.
    if let Some(reason) = reason {
        relay.on_close(connection_id, reason);
    }
    closed.cancel();

    if tokio::time::timeout(WRITER_GRACE, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }
    info!(connection = %connection_id, "Extension disconnected");
}
