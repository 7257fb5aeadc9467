//! Table of in-flight operations awaiting a reply.
//!
//! Each entry is settled exactly once, by whichever comes first: the reply,
//! the deadline timer, or closure of the target connection. Losers of that
//! race find the entry gone and do nothing.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tabrelay_protocols::{CloseReason, ConnectionId, CorrelationId, ReplyError};
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::registry::ClosureListener;

/// How many settled correlation ids to remember for late-reply diagnostics.
const SETTLED_HISTORY: usize = 1024;

/// How a pending operation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The extension replied with a result (absent results arrive as `null`).
    Reply(Value),
    /// The extension replied with an error.
    Failed(ReplyError),
    /// The deadline passed first.
    Timeout,
    /// The target connection closed first.
    ConnectionClosed(CloseReason),
}

struct PendingEntry {
    target: ConnectionId,
    slot: oneshot::Sender<Resolution>,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct TableState {
    entries: HashMap<CorrelationId, PendingEntry>,
    settled_order: VecDeque<CorrelationId>,
    settled: HashSet<CorrelationId>,
}

impl TableState {
    fn remember_settled(&mut self, id: CorrelationId) {
        if self.settled_order.len() == SETTLED_HISTORY {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled.insert(id.clone());
        self.settled_order.push_back(id);
    }
}

/// Handle the caller awaits on.
#[derive(Debug)]
pub struct PendingRequest {
    id: CorrelationId,
    target: ConnectionId,
    deadline: Instant,
    rx: oneshot::Receiver<Resolution>,
}

impl PendingRequest {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn target(&self) -> ConnectionId {
        self.target
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the entry to be settled.
    pub async fn wait(self) -> Resolution {
        // The sender only disappears without a value if the table is torn down.
        self.rx
            .await
            .unwrap_or(Resolution::ConnectionClosed(CloseReason::Shutdown))
    }
}

#[derive(Default)]
pub struct PendingTable {
    state: Mutex<TableState>,
    changed: Notify,
}

impl PendingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new operation bound to `target` and arm its deadline.
    pub fn create(self: &Arc<Self>, target: ConnectionId, timeout: Duration) -> PendingRequest {
        let id = CorrelationId::generate();
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();

        self.state.lock().entries.insert(
            id.clone(),
            PendingEntry {
                target,
                slot: tx,
                timer: None,
            },
        );

        // The entry exists before the timer can fire, so even a zero timeout
        // resolves through the table.
        let timer = spawn_deadline(Arc::downgrade(self), id.clone(), deadline);
        match self.state.lock().entries.get_mut(&id) {
            Some(entry) => entry.timer = Some(timer),
            None => timer.abort(),
        }

        PendingRequest {
            id,
            target,
            deadline,
            rx,
        }
    }

    /// Settle one entry. Returns `false` if it was already settled or never existed.
    pub fn resolve(&self, id: &CorrelationId, resolution: Resolution) -> bool {
        self.settle(id, None, resolution)
    }

    /// Settle one entry, but only if it was sent to `source`.
    ///
    /// A reply arriving over a different connection than the one the
    /// operation went to is ignored.
    pub fn resolve_from(
        &self,
        source: ConnectionId,
        id: &CorrelationId,
        resolution: Resolution,
    ) -> bool {
        self.settle(id, Some(source), resolution)
    }

    fn settle(
        &self,
        id: &CorrelationId,
        source: Option<ConnectionId>,
        resolution: Resolution,
    ) -> bool {
        let entry = {
            let mut state = self.state.lock();
            let owned_by_source = state
                .entries
                .get(id)
                .is_some_and(|entry| source.is_none_or(|source| source == entry.target));
            if !owned_by_source {
                return false;
            }
            let Some(entry) = state.entries.remove(id) else {
                return false;
            };
            state.remember_settled(id.clone());
            entry
        };

        if let Some(timer) = entry.timer {
            timer.abort();
        }
        // The caller may have stopped waiting; nothing to deliver then.
        let _ = entry.slot.send(resolution);
        self.changed.notify_waiters();
        true
    }

    /// Settle every entry bound to `connection` with `ConnectionClosed`.
    pub fn resolve_all_for_connection(&self, connection: ConnectionId, reason: &CloseReason) -> usize {
        let entries: Vec<PendingEntry> = {
            let mut state = self.state.lock();
            let ids: Vec<CorrelationId> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.target == connection)
                .map(|(id, _)| id.clone())
                .collect();
            ids.into_iter()
                .filter_map(|id| {
                    let entry = state.entries.remove(&id)?;
                    state.remember_settled(id);
                    Some(entry)
                })
                .collect()
        };

        let count = entries.len();
        for entry in entries {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
            let _ = entry.slot.send(Resolution::ConnectionClosed(reason.clone()));
        }

        if count > 0 {
            debug!(connection = %connection, count, reason = %reason, "Failed pending operations for closed connection");
            self.changed.notify_waiters();
        }
        count
    }

    /// Whether `id` was settled recently.
    pub fn was_settled(&self, id: &CorrelationId) -> bool {
        self.state.lock().settled.contains(id)
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.state.lock().entries.contains_key(id)
    }

    pub fn count_for(&self, connection: ConnectionId) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.target == connection)
            .count()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Wait until nothing is pending for `connection`, or `grace` elapses.
    ///
    /// Returns `true` if the connection became idle.
    pub async fn wait_until_idle(&self, connection: ConnectionId, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        loop {
            let changed = self.changed.notified();
            if self.count_for(connection) == 0 {
                return true;
            }
            if tokio::time::timeout_at(deadline, changed).await.is_err() {
                return self.count_for(connection) == 0;
            }
        }
    }
}

impl ClosureListener for PendingTable {
    fn connection_closed(&self, id: ConnectionId, reason: &CloseReason) {
        self.resolve_all_for_connection(id, reason);
    }
}

fn spawn_deadline(table: Weak<PendingTable>, id: CorrelationId, deadline: Instant) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(table) = table.upgrade() {
            if table.resolve(&id, Resolution::Timeout) {
                debug!(correlation_id = %id, "Pending operation timed out");
            }
        }
    })
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
