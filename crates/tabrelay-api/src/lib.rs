//! # TabRelay API
//!
//! The two network faces of the relay:
//! - **WebSocket** (`GET /extension`): one persistent connection per
//!   browser extension, adapted to the core's transport contract.
//! - **HTTP**: the tool-call surface (`/operations`, `/events`,
//!   `/settings`, `/connections`, `/health`).

pub mod error;
pub mod http;
pub mod server;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ServerError};
pub use http::routes::create_router;
pub use server::{RelayServer, ServerSettings, shutdown_signal};
pub use state::{AppState, OperationLimits};
pub use websocket::WsTransport;
