//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tabrelay_protocols::{BrokerError, RegistryError};
use thiserror::Error;

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unknown event category: {0}")]
    UnknownCategory(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Broker(err) => match err {
                BrokerError::NoActiveConnection { .. } => StatusCode::SERVICE_UNAVAILABLE,
                BrokerError::ConnectionClosed { .. } => StatusCode::BAD_GATEWAY,
                BrokerError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                BrokerError::MalformedMessage { .. } => StatusCode::BAD_REQUEST,
                BrokerError::OperationFailed { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::Registry(err) => match err {
                RegistryError::UnknownConnection(_) => StatusCode::NOT_FOUND,
                RegistryError::Send { .. } => StatusCode::BAD_GATEWAY,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownCategory(_) => StatusCode::NOT_FOUND,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Broker(err) => err.kind(),
            Self::Registry(RegistryError::UnknownConnection(_)) => "UnknownConnection",
            Self::Registry(_) => "ConnectionUnavailable",
            Self::BadRequest(_) => "BadRequest",
            Self::UnknownCategory(_) => "UnknownCategory",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}
