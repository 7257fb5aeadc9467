//! Connection registry.
//!
//! Tracks every extension connection from accept to close, decides which
//! connection should receive the next operation, and tells interested
//! parties when a connection goes away.
//!
//! Lifecycle: `Connecting -> Active -> Draining -> Closed`. A connection
//! becomes `Active` only after its hello frame; `Closed` entries are removed
//! from the table, so a closed id is simply unknown afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tabrelay_protocols::{
    CloseReason, ConnectionId, ExtensionHello, RegistryError, SelectionPolicy, TransportHandle,
};
use tokio::time::Instant;
use tracing::{debug, info};

/// State of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Active,
    Draining,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

/// Notified synchronously after a connection is removed.
pub trait ClosureListener: Send + Sync {
    fn connection_closed(&self, id: ConnectionId, reason: &CloseReason);
}

/// Point-in-time view of a connection, for diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<ExtensionHello>,
    pub connected_at: DateTime<Utc>,
    pub idle_ms: u64,
}

/// Outcome of a successful [`ConnectionRegistry::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConnection {
    pub id: ConnectionId,
    pub previous_state: ConnectionState,
    pub reason: CloseReason,
}

struct ConnectionEntry {
    state: ConnectionState,
    handle: Arc<dyn TransportHandle>,
    last_seen: Instant,
    connected_at: DateTime<Utc>,
    identity: Option<ExtensionHello>,
}

pub struct ConnectionRegistry {
    policy: SelectionPolicy,
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
    listeners: RwLock<Vec<Arc<dyn ClosureListener>>>,
}

impl ConnectionRegistry {
    pub fn new(policy: SelectionPolicy) -> Self {
        Self {
            policy,
            next_id: AtomicU64::new(1),
            connections: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    /// Subscribe to closure notifications.
    pub fn add_listener(&self, listener: Arc<dyn ClosureListener>) {
        self.listeners.write().push(listener);
    }

    /// Record a freshly accepted connection in the `Connecting` state.
    pub fn register(&self, handle: Arc<dyn TransportHandle>) -> ConnectionId {
        let id = ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = ConnectionEntry {
            state: ConnectionState::Connecting,
            handle,
            last_seen: Instant::now(),
            connected_at: Utc::now(),
            identity: None,
        };
        self.connections.lock().insert(id, entry);
        debug!(connection = %id, "Connection registered");
        id
    }

    /// Complete the handshake and make the connection eligible for work.
    pub fn confirm(&self, id: ConnectionId, hello: ExtensionHello) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock();
        let entry = connections
            .get_mut(&id)
            .filter(|entry| entry.state == ConnectionState::Connecting)
            .ok_or(RegistryError::UnknownConnection(id))?;

        info!(
            connection = %id,
            extension_id = %hello.extension_id,
            version = hello.version.as_deref().unwrap_or("unknown"),
            "Extension connection active"
        );
        entry.state = ConnectionState::Active;
        entry.last_seen = Instant::now();
        entry.identity = Some(hello);
        Ok(())
    }

    /// Record inbound traffic. Unknown ids are ignored.
    pub fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.connections.lock().get_mut(&id) {
            entry.last_seen = Instant::now();
        }
    }

    /// Stop routing new operations to an active connection.
    pub fn begin_drain(&self, id: ConnectionId) -> Result<(), RegistryError> {
        let mut connections = self.connections.lock();
        let entry = connections
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;

        match entry.state {
            ConnectionState::Active | ConnectionState::Connecting => {
                entry.state = ConnectionState::Draining;
                info!(connection = %id, "Connection draining");
                Ok(())
            }
            ConnectionState::Draining => Ok(()),
            ConnectionState::Closed => Err(RegistryError::UnknownConnection(id)),
        }
    }

    /// Remove a connection, shut its transport and notify listeners.
    ///
    /// Only the first close of an id succeeds; later calls return
    /// [`RegistryError::UnknownConnection`] and notify nobody.
    pub fn close(
        &self,
        id: ConnectionId,
        reason: CloseReason,
    ) -> Result<ClosedConnection, RegistryError> {
        let entry = self
            .connections
            .lock()
            .remove(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;

        entry.handle.close();
        info!(connection = %id, reason = %reason, "Connection closed");

        let listeners: Vec<_> = self.listeners.read().iter().cloned().collect();
        for listener in listeners {
            listener.connection_closed(id, &reason);
        }

        Ok(ClosedConnection {
            id,
            previous_state: entry.state,
            reason,
        })
    }

    /// Choose the connection for the next operation, if any is active.
    pub fn pick_target(&self) -> Option<ConnectionId> {
        let connections = self.connections.lock();
        let active = connections
            .iter()
            .filter(|(_, entry)| entry.state == ConnectionState::Active);

        match self.policy {
            SelectionPolicy::MostRecentlyActive => active
                .max_by(|(a_id, a), (b_id, b)| {
                    a.last_seen.cmp(&b.last_seen).then_with(|| b_id.cmp(a_id))
                })
                .map(|(id, _)| *id),
            SelectionPolicy::FirstAvailable => active.map(|(id, _)| *id).min(),
        }
    }

    /// Hand a text frame to the connection's transport.
    ///
    /// The transport handle is cloned out of the table so the send itself
    /// runs without holding the registry lock.
    pub fn send(&self, id: ConnectionId, text: String) -> Result<(), RegistryError> {
        let handle = self
            .connections
            .lock()
            .get(&id)
            .map(|entry| entry.handle.clone())
            .ok_or(RegistryError::UnknownConnection(id))?;

        handle
            .send(text)
            .map_err(|source| RegistryError::Send { id, source })
    }

    pub fn state(&self, id: ConnectionId) -> Option<ConnectionState> {
        self.connections.lock().get(&id).map(|entry| entry.state)
    }

    pub fn is_active(&self, id: ConnectionId) -> bool {
        self.state(id) == Some(ConnectionState::Active)
    }

    /// Ids of all active connections, ascending.
    pub fn list_active(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, entry)| entry.state == ConnectionState::Active)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Ids of every registered connection regardless of state, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.connections.lock().keys().copied().collect();
        ids.sort();
        ids
    }

    /// Diagnostic snapshot of every registered connection.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let now = Instant::now();
        let mut infos: Vec<_> = self
            .connections
            .lock()
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                state: entry.state,
                identity: entry.identity.clone(),
                connected_at: entry.connected_at,
                idle_ms: now.saturating_duration_since(entry.last_seen).as_millis() as u64,
            })
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Connections with no inbound traffic for longer than `threshold`.
    pub fn stale_connections(&self, threshold: Duration) -> Vec<ConnectionId> {
        let now = Instant::now();
        let mut ids: Vec<_> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.last_seen) > threshold)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Close every stale connection with [`CloseReason::HeartbeatTimeout`].
    pub fn sweep_stale(&self, threshold: Duration) -> Vec<ConnectionId> {
        self.stale_connections(threshold)
            .into_iter()
            .filter(|id| self.close(*id, CloseReason::HeartbeatTimeout).is_ok())
            .collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
