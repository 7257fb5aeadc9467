//! The relay: one object wiring registry, pending table, broker, filter and
//! event ingest together, with the entry points the transport layer calls.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde_json::Value;
use tabrelay_config::Config;
use tabrelay_protocols::{
    BrokerError, CloseReason, ConnectionId, FilterMode, InboundFrame, RegistryError,
    SelectionPolicy, ServerFrame, TransportHandle,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{ExecuteRequest, Filtered, RequestBroker};
use crate::filter::{FilterEngine, FilterError, FilterSettings, ModeSwitch};
use crate::heartbeat::{self, HeartbeatSettings};
use crate::ingest::{EventIngest, IngestSettings};
use crate::pending::PendingTable;
use crate::registry::{ConnectionInfo, ConnectionRegistry};

/// Everything needed to build a [`Relay`].
#[derive(Debug, Clone, PartialEq)]
pub struct RelaySettings {
    pub selection_policy: SelectionPolicy,
    pub initial_mode: FilterMode,
    pub allow_mode_override: bool,
    pub filter: FilterSettings,
    pub ingest: IngestSettings,
    pub heartbeat: HeartbeatSettings,
    pub drain_grace: Duration,
}

impl RelaySettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            selection_policy: config.relay.selection_policy,
            initial_mode: config.privacy.mode,
            allow_mode_override: config.privacy.allow_mode_override,
            filter: FilterSettings {
                entropy_threshold: config.privacy.entropy_threshold,
                entropy_min_length: config.privacy.entropy_min_length,
                sensitive_keys: config.privacy.sensitive_keys.clone(),
                value_patterns: config.privacy.value_patterns.clone(),
            },
            ingest: IngestSettings {
                console_capacity: config.events.console_capacity,
                network_capacity: config.events.network_capacity,
                error_capacity: config.events.error_capacity,
                string_size_limit: config.events.string_size_limit,
                include_request_headers: config.events.include_request_headers,
                include_response_headers: config.events.include_response_headers,
            },
            heartbeat: HeartbeatSettings {
                interval: config.relay.heartbeat_interval(),
                timeout: config.relay.heartbeat_timeout(),
            },
            drain_grace: config.relay.drain_grace(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct Relay {
    registry: Arc<ConnectionRegistry>,
    pending: Arc<PendingTable>,
    mode: Arc<ModeSwitch>,
    broker: RequestBroker,
    ingest: EventIngest,
    heartbeat: HeartbeatSettings,
    drain_grace: Duration,
}

impl Relay {
    pub fn new(settings: RelaySettings) -> Result<Self, FilterError> {
        let filter = Arc::new(FilterEngine::new(&settings.filter)?);
        let registry = Arc::new(ConnectionRegistry::new(settings.selection_policy));
        let pending = PendingTable::new();
        registry.add_listener(pending.clone());
        let mode = Arc::new(ModeSwitch::new(settings.initial_mode));

        let broker = RequestBroker::new(
            registry.clone(),
            pending.clone(),
            filter.clone(),
            mode.clone(),
            settings.allow_mode_override,
        );
        let ingest = EventIngest::new(registry.clone(), filter, mode.clone(), settings.ingest);

        Ok(Self {
            registry,
            pending,
            mode,
            broker,
            ingest,
            heartbeat: settings.heartbeat,
            drain_grace: settings.drain_grace,
        })
    }

    // Transport-facing entry points.

    /// Register a newly accepted transport.
    pub fn accept(&self, handle: Arc<dyn TransportHandle>) -> ConnectionId {
        self.registry.register(handle)
    }

    /// Dispatch one inbound text frame. Malformed frames are logged and dropped.
    pub fn on_message(&self, id: ConnectionId, text: &str) {
        self.registry.touch(id);

        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(connection = %id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match frame {
            InboundFrame::Reply {
                correlation_id,
                result,
                error,
            } => {
                self.broker.handle_reply(id, &correlation_id, result, error);
            }
            InboundFrame::Event { category, payload } => {
                self.ingest.ingest(id, category, payload);
            }
            InboundFrame::Hello(hello) => match self.registry.confirm(id, hello) {
                Ok(()) => self.send_control(id, &ServerFrame::Welcome { connection_id: id }),
                Err(e) => debug!(connection = %id, error = %e, "Ignoring repeated hello"),
            },
            InboundFrame::Heartbeat => self.send_control(id, &ServerFrame::HeartbeatAck),
        }
    }

    /// Record transport-level traffic (pings, pongs) as liveness.
    pub fn on_traffic(&self, id: ConnectionId) {
        self.registry.touch(id);
    }

    /// The transport went away.
    pub fn on_close(&self, id: ConnectionId, reason: CloseReason) {
        if let Err(e) = self.registry.close(id, reason) {
            debug!(connection = %id, error = %e, "Close for connection already gone");
        }
    }

    fn send_control(&self, id: ConnectionId, frame: &ServerFrame) {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(connection = %id, error = %e, "Failed to encode control frame");
                return;
            }
        };
        if let Err(e) = self.registry.send(id, text) {
            warn!(connection = %id, error = %e, "Failed to send control frame");
        }
    }

    // Caller-facing operations.

    pub async fn execute(&self, request: ExecuteRequest) -> Result<Value, BrokerError> {
        self.broker.execute(request).await
    }

    /// Execute and report the filter mode the result went through.
    pub async fn execute_filtered(&self, request: ExecuteRequest) -> Result<Filtered, BrokerError> {
        self.broker.execute_filtered(request).await
    }

    pub fn mode(&self) -> FilterMode {
        self.mode.get()
    }

    /// Switch the process-wide filter mode. Applies to every later result
    /// and ingested event.
    pub fn set_mode(&self, mode: FilterMode) -> FilterMode {
        let previous = self.mode.set(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "Filter mode changed");
        }
        previous
    }

    pub fn events(&self) -> &EventIngest {
        &self.ingest
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.registry.snapshot()
    }

    pub fn active_connections(&self) -> Vec<ConnectionId> {
        self.registry.list_active()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    // Lifecycle.

    /// Start the liveness sweeper.
    pub fn spawn_heartbeat(&self, cancel: CancellationToken) -> JoinHandle<()> {
        heartbeat::spawn_sweeper(self.registry.clone(), self.heartbeat, cancel)
    }

    /// Stop routing work to `id`, let in-flight operations finish (up to
    /// the drain grace period) and close it.
    ///
    /// Returns whether the connection went idle before the grace period ran out.
    pub async fn drain_connection(&self, id: ConnectionId) -> Result<bool, RegistryError> {
        self.registry.begin_drain(id)?;
        let idle = self.pending.wait_until_idle(id, self.drain_grace).await;
        if !idle {
            warn!(
                connection = %id,
                pending = self.pending.count_for(id),
                "Drain grace period expired with operations in flight"
            );
        }
        self.on_close(id, CloseReason::Drained);
        Ok(idle)
    }

    /// Drain every connection concurrently, then close whatever is left.
    pub async fn shutdown(&self) {
        let ids = self.registry.ids();
        info!(connections = ids.len(), pending = self.pending.len(), "Relay shutting down");

        for id in &ids {
            // Already-closed ids are fine to skip.
            let _ = self.registry.begin_drain(*id);
        }
        join_all(
            ids.iter()
                .map(|id| self.pending.wait_until_idle(*id, self.drain_grace)),
        )
        .await;

        for id in ids {
            self.on_close(id, CloseReason::Shutdown);
        }
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
