//! Tool-call API handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabrelay_core::{BufferedEvent, ConnectionInfo, ExecuteRequest, Filtered, IngestStats};
use tabrelay_protocols::{ConnectionId, EventCategory, FilterMode};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Operations
// ============================================================================

/// Body of `POST /operations/{name}`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// Operation parameters. Must be an object; `null` or absent means `{}`.
    #[serde(default)]
    pub params: Value,

    /// Overrides the default timeout. Clamped to the configured maximum.
    #[serde(alias = "timeout_ms")]
    pub timeout_ms: Option<u64>,

    /// Filter mode for this call only.
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OperationResponse {
    pub result: Value,
    /// Mode the result was filtered with.
    pub mode: FilterMode,
}

/// Execute one operation on the active extension and return its filtered result.
pub async fn execute_operation(
    State(state): State<Arc<AppState>>,
    Path(operation): Path<String>,
    body: Result<Json<OperationRequest>, JsonRejection>,
) -> Result<Json<OperationResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let timeout = state
        .limits
        .resolve(body.timeout_ms)
        .ok_or_else(|| ApiError::BadRequest("timeoutMs must be greater than zero".to_string()))?;

    let requested = body.mode.as_deref().map(parse_mode).transpose()?;

    let mut request = ExecuteRequest::new(operation, body.params, timeout);
    if let Some(mode) = requested {
        request = request.with_mode(mode);
    }
    state.record_operation();
    let Filtered { result, mode } = state.relay.execute_filtered(request).await?;
    Ok(Json(OperationResponse { result, mode }))
}

fn parse_mode(raw: &str) -> Result<FilterMode, ApiError> {
    raw.parse::<FilterMode>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Newest `limit` events only.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub category: EventCategory,
    pub count: usize,
    pub events: Vec<BufferedEvent>,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub cleared: usize,
}

fn parse_category(raw: &str) -> Result<EventCategory, ApiError> {
    raw.parse::<EventCategory>()
        .map_err(|_| ApiError::UnknownCategory(raw.to_string()))
}

/// Snapshot of one category's buffer, oldest first.
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let category = parse_category(&category)?;
    let events = match query.limit {
        Some(limit) => state.relay.events().recent(category, limit),
        None => state.relay.events().drain(category),
    };
    Ok(Json(EventsResponse {
        category,
        count: events.len(),
        events,
    }))
}

pub async fn clear_events(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> Result<Json<ClearedResponse>, ApiError> {
    let category = parse_category(&category)?;
    let cleared = state.relay.events().clear(category);
    info!(%category, cleared, "Event buffer cleared");
    Ok(Json(ClearedResponse { cleared }))
}

pub async fn clear_all_events(State(state): State<Arc<AppState>>) -> Json<ClearedResponse> {
    let cleared = state.relay.events().clear_all();
    info!(cleared, "All event buffers cleared");
    Json(ClearedResponse { cleared })
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct ModeResponse {
    pub mode: FilterMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<FilterMode>,
}

pub async fn get_filter_mode(State(state): State<Arc<AppState>>) -> Json<ModeResponse> {
    Json(ModeResponse {
        mode: state.relay.mode(),
        previous: None,
    })
}

pub async fn set_filter_mode(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SetModeRequest>, JsonRejection>,
) -> Result<Json<ModeResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mode = parse_mode(&body.mode)?;
    let previous = state.relay.set_mode(mode);
    Ok(Json(ModeResponse {
        mode,
        previous: Some(previous),
    }))
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionInfo>,
}

pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<ConnectionsResponse> {
    Json(ConnectionsResponse {
        connections: state.relay.connections(),
    })
}

#[derive(Debug, Serialize)]
pub struct DrainResponse {
    pub connection: ConnectionId,
    /// Whether in-flight operations finished before the grace period ran out.
    pub idle: bool,
}

/// Stop routing to a connection, wait for its in-flight work, then close it.
pub async fn drain_connection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> Result<Json<DrainResponse>, ApiError> {
    let id = ConnectionId::new(id);
    let idle = state.relay.drain_connection(id).await?;
    info!(connection = %id, idle, "Connection drained");
    Ok(Json(DrainResponse { connection: id, idle }))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub mode: FilterMode,
    pub active_connections: usize,
    pub pending_operations: usize,
    pub operations_total: u64,
    pub events: IngestStats,
}

/// Always 200 while the process is serving; `status` says whether an
/// extension is available.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let active = state.relay.active_connections().len();
    Json(HealthResponse {
        status: if active > 0 { "ok" } else { "no-extension" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime().as_secs(),
        mode: state.relay.mode(),
        active_connections: active,
        pending_operations: state.relay.pending_count(),
        operations_total: state.operation_count(),
        events: state.relay.events().stats(),
    })
}
