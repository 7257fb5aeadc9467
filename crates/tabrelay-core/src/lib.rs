//! # TabRelay Core
//!
//! The relay between tool callers and browser extensions, independent of
//! any particular transport.
//!
//! ## Components
//!
//! - [`registry`] - connection lifecycle and target selection
//! - [`pending`] - in-flight operations awaiting a reply
//! - [`broker`] - `execute`: send, correlate, wait, filter
//! - [`filter`] - the privacy filter applied to everything that leaves
//! - [`ingest`] - bounded buffers for unsolicited events
//! - [`heartbeat`] - liveness sweeping
//! - [`relay`] - the [`Relay`] facade wiring it all together
//!
//! The transport layer only needs [`Relay::accept`], [`Relay::on_message`]
//! and [`Relay::on_close`], plus a [`TransportHandle`](tabrelay_protocols::TransportHandle)
//! implementation for the write side.

pub mod broker;
pub mod filter;
pub mod heartbeat;
pub mod ingest;
pub mod pending;
pub mod registry;
pub mod relay;

#[cfg(test)]
pub(crate) mod test_support;

pub use broker::{ExecuteRequest, Filtered, RequestBroker};
pub use filter::{FilterEngine, FilterError, FilterSettings, ModeSwitch};
pub use heartbeat::HeartbeatSettings;
pub use ingest::{BufferedEvent, EventIngest, IngestSettings, IngestStats};
pub use pending::{PendingTable, Resolution};
pub use registry::{ConnectionInfo, ConnectionRegistry, ConnectionState};
pub use relay::{Relay, RelaySettings};
