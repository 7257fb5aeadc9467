//! HTTP route definitions.

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;
use crate::websocket::extension_ws_handler;

/// Create the main router.
///
/// ## Route Structure
///
/// ```text
/// /operations
///   POST   /operations/{name}          - Execute an operation on the active extension
///
/// /events
///   GET    /events/{category}?limit=N  - Buffered console/network/error events
///   DELETE /events/{category}          - Clear one buffer
///   DELETE /events                     - Clear every buffer
///
/// /settings
///   GET    /settings/filter-mode       - Current filter mode
///   PUT    /settings/filter-mode       - Switch filter mode
///
/// /connections
///   GET    /connections                - Registered extension connections
///   POST   /connections/{id}/drain     - Drain and close one connection
///
/// /health     - Liveness and relay summary
/// /extension  - Extension WebSocket
/// ```
pub fn create_router(state: Arc<AppState>) -> Router {
    let operation_routes = Router::new()
        .route("/{name}", post(handlers::execute_operation))
        .with_state(state.clone());

    let event_routes = Router::new()
        .route("/", delete(handlers::clear_all_events))
        .route(
            "/{category}",
            get(handlers::list_events).delete(handlers::clear_events),
        )
        .with_state(state.clone());

    let settings_routes = Router::new()
        .route(
            "/filter-mode",
            get(handlers::get_filter_mode).put(handlers::set_filter_mode),
        )
        .with_state(state.clone());

    let connection_routes = Router::new()
        .route("/", get(handlers::list_connections))
        .route("/{id}/drain", post(handlers::drain_connection))
        .with_state(state.clone());

    let health_route = Router::new()
        .route("/health", get(handlers::health))
        .with_state(state.clone());

    let ws_route = Router::new()
        .route("/extension", get(extension_ws_handler))
        .with_state(state);

    Router::new()
        .nest("/operations", operation_routes)
        .nest("/events", event_routes)
        .nest("/settings", settings_routes)
        .nest("/connections", connection_routes)
        .merge(health_route)
        .merge(ws_route)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
