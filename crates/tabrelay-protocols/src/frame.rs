//! JSON frames exchanged with the browser extension.
//!
//! Outbound operation:
//! `{ "correlationId": "...", "operation": "...", "params": {...} }`
//!
//! Inbound frames are classified by shape rather than by a single tag,
//! because replies and events predate the control frames:
//! - reply: has `correlationId`
//! - event: has `category`
//! - control: has `type` (`hello`, `heartbeat`)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;
use crate::event::EventCategory;
use crate::ids::{ConnectionId, CorrelationId};

/// Operation request sent to an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundFrame {
    pub correlation_id: CorrelationId,
    pub operation: String,
    pub params: Value,
}

impl OutboundFrame {
    pub fn new(correlation_id: CorrelationId, operation: impl Into<String>, params: Value) -> Self {
        Self {
            correlation_id,
            operation: operation.into(),
            params,
        }
    }

    /// Encode as a text frame.
    pub fn to_text(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Encode(e.to_string()))
    }
}

/// Failure reported by the extension for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub kind: String,
    pub message: String,
}

/// Identity an extension announces right after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionHello {
    pub extension_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyFrame {
    correlation_id: CorrelationId,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<ReplyError>,
}

#[derive(Debug, Deserialize)]
struct EventFrame {
    category: EventCategory,
    payload: Value,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Reply to an earlier operation.
    Reply {
        correlation_id: CorrelationId,
        result: Option<Value>,
        error: Option<ReplyError>,
    },
    /// Unsolicited console, network or error event.
    Event {
        category: EventCategory,
        payload: Value,
    },
    /// Identity handshake.
    Hello(ExtensionHello),
    /// Liveness ping from the extension.
    Heartbeat,
}

impl InboundFrame {
    /// Decode a text frame received from an extension.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;
        let object = value.as_object().ok_or(FrameError::NotAnObject)?;

        if object.contains_key("correlationId") {
            let reply: ReplyFrame = serde_json::from_value(value)
                .map_err(|e| FrameError::InvalidReply(e.to_string()))?;
            return Ok(Self::Reply {
                correlation_id: reply.correlation_id,
                result: reply.result,
                error: reply.error,
            });
        }

        if object.contains_key("category") {
            let event: EventFrame = serde_json::from_value(value)
                .map_err(|e| FrameError::InvalidEvent(e.to_string()))?;
            if !event.payload.is_object() {
                return Err(FrameError::InvalidEvent("payload must be an object".to_string()));
            }
            return Ok(Self::Event {
                category: event.category,
                payload: event.payload,
            });
        }

        match object.get("type").and_then(Value::as_str) {
            Some("hello") => {
                let hello: ExtensionHello = serde_json::from_value(value)
                    .map_err(|e| FrameError::InvalidControl(e.to_string()))?;
                Ok(Self::Hello(hello))
            }
            Some("heartbeat") => Ok(Self::Heartbeat),
            Some(other) => Err(FrameError::InvalidControl(format!("unknown type '{}'", other))),
            None => Err(FrameError::UnrecognizedShape),
        }
    }
}

/// Control frames the relay sends to an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    /// Handshake accepted.
    #[serde(rename_all = "camelCase")]
    Welcome { connection_id: ConnectionId },
    /// Answer to a heartbeat.
    HeartbeatAck,
}

impl ServerFrame {
    pub fn to_text(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Encode(e.to_string()))
    }
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
