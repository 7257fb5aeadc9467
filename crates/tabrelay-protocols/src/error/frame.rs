//! Frame decoding errors.

use thiserror::Error;

/// A frame that could not be decoded or encoded.
///
/// Inbound frame errors are logged and dropped; they never reach a caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Invalid reply frame: {0}")]
    InvalidReply(String),

    #[error("Invalid event frame: {0}")]
    InvalidEvent(String),

    #[error("Invalid control frame: {0}")]
    InvalidControl(String),

    #[error("Frame has neither correlationId, category nor type")]
    UnrecognizedShape,

    #[error("Failed to encode frame: {0}")]
    Encode(String),
}
