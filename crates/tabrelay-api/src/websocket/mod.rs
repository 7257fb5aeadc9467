//! Extension WebSocket endpoint.
//!
//! Each browser extension holds one socket to `GET /extension`. The
//! handler registers it with the relay, feeds every text frame to
//! [`Relay::on_message`](tabrelay_core::Relay::on_message) and reports the
//! closure when the socket ends.

mod handler;
mod transport;

pub use handler::extension_ws_handler;
pub use transport::WsTransport;
