//! Request broker: turns a caller's operation into a correlated frame,
//! waits for the outcome and hands back a filtered result.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tabrelay_protocols::{
    BrokerError, CloseReason, ConnectionId, CorrelationId, FilterMode, OutboundFrame, ReplyError,
};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::filter::{FilterEngine, ModeSwitch};
use crate::pending::{PendingTable, Resolution};
use crate::registry::ConnectionRegistry;

/// One operation to run on the browser side.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub operation: String,
    pub params: Value,
    pub timeout: Duration,
    /// Filter mode for this call only. Honoured when overrides are enabled.
    pub mode: Option<FilterMode>,
}

impl ExecuteRequest {
    pub fn new(operation: impl Into<String>, params: Value, timeout: Duration) -> Self {
        Self {
            operation: operation.into(),
            params,
            timeout,
            mode: None,
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

/// A successful call's result and the mode it was filtered with.
#[derive(Debug, Clone, PartialEq)]
pub struct Filtered {
    pub result: Value,
    pub mode: FilterMode,
}

pub struct RequestBroker {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    filter: Arc<FilterEngine>,
    mode: Arc<ModeSwitch>,
    allow_mode_override: bool,
}

impl RequestBroker {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        pending: Arc<PendingTable>,
        filter: Arc<FilterEngine>,
        mode: Arc<ModeSwitch>,
        allow_mode_override: bool,
    ) -> Self {
        Self {
            registry,
            pending,
            filter,
            mode,
            allow_mode_override,
        }
    }

    /// Mode a call should be filtered with.
    pub fn effective_mode(&self, requested: Option<FilterMode>) -> FilterMode {
        match requested {
            Some(mode) if self.allow_mode_override => mode,
            _ => self.mode.get(),
        }
    }

    /// Run one operation on the selected extension connection.
    ///
    /// Every call ends in exactly one outcome: a filtered result or one of
    /// the [`BrokerError`] variants. A connection that closes while the call
    /// is pending yields `ConnectionClosed`, never `Timeout`.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<Value, BrokerError> {
        self.execute_filtered(request).await.map(|filtered| filtered.result)
    }

    /// Like [`execute`](Self::execute), also reporting the mode applied.
    pub async fn execute_filtered(&self, request: ExecuteRequest) -> Result<Filtered, BrokerError> {
        let ExecuteRequest {
            operation,
            params,
            timeout,
            mode,
        } = request;

        let params = match params {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(BrokerError::MalformedMessage {
                    operation,
                    detail: format!("params must be a JSON object, got {}", json_kind(&other)),
                });
            }
        };

        let started = Instant::now();
        let target = self
            .registry
            .pick_target()
            .ok_or_else(|| BrokerError::NoActiveConnection {
                operation: operation.clone(),
            })?;

        let pending = self.pending.create(target, timeout);
        let correlation_id = pending.id().clone();
        debug!(
            operation = %operation,
            connection = %target,
            correlation_id = %correlation_id,
            timeout_ms = timeout.as_millis() as u64,
            "Dispatching operation"
        );

        let text = match OutboundFrame::new(correlation_id.clone(), &operation, params).to_text() {
            Ok(text) => text,
            Err(e) => {
                self.pending.resolve(
                    &correlation_id,
                    Resolution::ConnectionClosed(CloseReason::SendFailed),
                );
                return Err(BrokerError::MalformedMessage {
                    operation,
                    detail: e.to_string(),
                });
            }
        };

        if let Err(e) = self.registry.send(target, text) {
            warn!(operation = %operation, connection = %target, error = %e, "Failed to send operation");
            // A connection that cannot take frames is no longer usable. Closing
            // it fails every entry bound to it; the explicit resolve covers a
            // close that already happened elsewhere.
            if let Err(e) = self.registry.close(target, CloseReason::SendFailed) {
                debug!(connection = %target, error = %e, "Connection already closed");
            }
            self.pending.resolve(
                &correlation_id,
                Resolution::ConnectionClosed(CloseReason::SendFailed),
            );
        }

        let resolution = pending.wait().await;
        let elapsed = started.elapsed();
        self.finish(operation, target, elapsed, resolution, mode)
    }

    fn finish(
        &self,
        operation: String,
        connection: ConnectionId,
        elapsed: Duration,
        resolution: Resolution,
        mode: Option<FilterMode>,
    ) -> Result<Filtered, BrokerError> {
        let mode = self.effective_mode(mode);
        match resolution {
            Resolution::Reply(result) => {
                debug!(operation = %operation, connection = %connection, elapsed_ms = elapsed.as_millis() as u64, "Operation completed");
                Ok(Filtered {
                    result: self.filter.filter(&result, mode),
                    mode,
                })
            }
            Resolution::Failed(ReplyError { kind, message }) => Err(BrokerError::OperationFailed {
                operation,
                connection,
                kind,
                message: self.filter.filter_text(&message, mode).into_owned(),
            }),
            Resolution::Timeout => {
                warn!(operation = %operation, connection = %connection, elapsed_ms = elapsed.as_millis() as u64, "Operation timed out");
                Err(BrokerError::Timeout {
                    operation,
                    connection,
                    elapsed,
                })
            }
            Resolution::ConnectionClosed(reason) => Err(BrokerError::ConnectionClosed {
                operation,
                connection,
                reason,
                elapsed,
            }),
        }
    }

    /// Route a reply frame from `source` to its waiter.
    ///
    /// Returns `false` when nothing was waiting: a duplicate, a reply after
    /// timeout, or a reply from the wrong connection.
    pub fn handle_reply(
        &self,
        source: ConnectionId,
        correlation_id: &CorrelationId,
        result: Option<Value>,
        error: Option<ReplyError>,
    ) -> bool {
        let resolution = match error {
            Some(error) => Resolution::Failed(error),
            None => Resolution::Reply(result.unwrap_or(Value::Null)),
        };

        let delivered = self.pending.resolve_from(source, correlation_id, resolution);
        if !delivered {
            if self.pending.was_settled(correlation_id) {
                debug!(connection = %source, correlation_id = %correlation_id, "Dropping late or duplicate reply");
            } else {
                debug!(connection = %source, correlation_id = %correlation_id, "Dropping reply for unknown operation");
            }
        }
        delivered
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
