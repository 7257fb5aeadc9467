//! # TabRelay Protocols
//!
//! Shared vocabulary for the TabRelay workspace.
//! Contains only types and trait definitions - no I/O.
//!
//! ## Contents
//!
//! - [`ConnectionId`] / [`CorrelationId`] - identifiers for extension connections and in-flight operations
//! - [`FilterMode`] / [`SelectionPolicy`] - process-wide behaviour switches
//! - [`EventCategory`] - buckets for unsolicited extension events
//! - [`frame`] - the JSON frames exchanged with the extension
//! - [`TransportHandle`] - what the core needs from a live connection
//! - [`error`] - error enums shared by every layer

pub mod error;
pub mod event;
pub mod frame;
pub mod ids;
pub mod mode;
pub mod transport;

pub use error::{BrokerError, FrameError, RegistryError, TransportError};
pub use event::EventCategory;
pub use frame::{ExtensionHello, InboundFrame, OutboundFrame, ReplyError, ServerFrame};
pub use ids::{ConnectionId, CorrelationId};
pub use mode::{FilterMode, SelectionPolicy};
pub use transport::{CloseReason, TransportHandle};
