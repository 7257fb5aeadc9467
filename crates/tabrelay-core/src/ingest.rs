//! Bounded buffers for unsolicited extension events.
//!
//! Events are filtered on the way in, so a buffer never holds anything the
//! privacy filter would have removed. Each category keeps only its most
//! recent `capacity` events; the oldest is evicted to make room.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tabrelay_protocols::{ConnectionId, EventCategory};
use tracing::{debug, trace};

use crate::filter::{FilterEngine, ModeSwitch};
use crate::registry::ConnectionRegistry;

const TRUNCATION_SUFFIX: &str = "... (truncated)";

/// Capacity and shaping options for ingested events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub console_capacity: usize,
    pub network_capacity: usize,
    pub error_capacity: usize,
    /// Strings longer than this many characters are cut.
    pub string_size_limit: usize,
    pub include_request_headers: bool,
    pub include_response_headers: bool,
}

impl IngestSettings {
    pub fn capacity(&self, category: EventCategory) -> usize {
        match category {
            EventCategory::Console => self.console_capacity,
            EventCategory::Network => self.network_capacity,
            EventCategory::Error => self.error_capacity,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            console_capacity: 50,
            network_capacity: 50,
            error_capacity: 50,
            string_size_limit: 500,
            include_request_headers: false,
            include_response_headers: false,
        }
    }
}

/// One stored event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferedEvent {
    /// Per-category, strictly increasing.
    pub sequence: u64,
    pub connection_id: ConnectionId,
    pub category: EventCategory,
    pub received_at: DateTime<Utc>,
    pub payload: Value,
}

/// Fixed-capacity FIFO for one category.
#[derive(Debug)]
pub struct EventBuffer {
    capacity: usize,
    events: VecDeque<BufferedEvent>,
    next_sequence: u64,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: VecDeque::with_capacity(capacity.min(1024)),
            next_sequence: 1,
        }
    }

    /// Append an event, returning the evicted one if the buffer was full.
    pub fn push(
        &mut self,
        connection_id: ConnectionId,
        category: EventCategory,
        payload: Value,
    ) -> Option<BufferedEvent> {
        if self.capacity == 0 {
            return None;
        }

        let evicted = if self.events.len() >= self.capacity {
            self.events.pop_front()
        } else {
            None
        };

        self.events.push_back(BufferedEvent {
            sequence: self.next_sequence,
            connection_id,
            category,
            received_at: Utc::now(),
            payload,
        });
        self.next_sequence += 1;
        evicted
    }

    /// Oldest-first copy of the most recent `limit` events (all if `None`).
    pub fn snapshot(&self, limit: Option<usize>) -> Vec<BufferedEvent> {
        let skip = limit.map_or(0, |limit| self.events.len().saturating_sub(limit));
        self.events.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.events.len();
        self.events.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Counters and fill levels, for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestStats {
    pub accepted: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub console: usize,
    pub network: usize,
    pub error: usize,
}

pub struct EventIngest {
    registry: Arc<ConnectionRegistry>,
    filter: Arc<FilterEngine>,
    mode: Arc<ModeSwitch>,
    settings: IngestSettings,
    buffers: [Mutex<EventBuffer>; 3],
    accepted: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl EventIngest {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        filter: Arc<FilterEngine>,
        mode: Arc<ModeSwitch>,
        settings: IngestSettings,
    ) -> Self {
        let buffers = EventCategory::ALL.map(|category| Mutex::new(EventBuffer::new(settings.capacity(category))));
        Self {
            registry,
            filter,
            mode,
            settings,
            buffers,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// Filter and store one event.
    ///
    /// Events from connections that are not active are dropped and `false`
    /// is returned.
    pub fn ingest(&self, connection: ConnectionId, category: EventCategory, payload: Value) -> bool {
        if !self.registry.is_active(connection) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(connection = %connection, category = %category, "Dropping event from inactive connection");
            return false;
        }

        let payload = self.shape(category, payload);
        let payload = self.filter.filter(&payload, self.mode.get());
        let payload = truncate_strings(payload, self.settings.string_size_limit);

        let evicted = self.buffers[category.index()]
            .lock()
            .push(connection, category, payload);
        if let Some(evicted) = evicted {
            self.evicted.fetch_add(1, Ordering::Relaxed);
            trace!(category = %category, sequence = evicted.sequence, "Evicted oldest event");
        }
        self.accepted.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Oldest-first copy of everything buffered for `category`. The buffer
    /// itself is left untouched.
    pub fn drain(&self, category: EventCategory) -> Vec<BufferedEvent> {
        self.buffers[category.index()].lock().snapshot(None)
    }

    /// Like [`drain`](Self::drain) but limited to the newest `limit` events.
    pub fn recent(&self, category: EventCategory, limit: usize) -> Vec<BufferedEvent> {
        self.buffers[category.index()].lock().snapshot(Some(limit))
    }

    /// Empty one category, returning how many events were removed.
    pub fn clear(&self, category: EventCategory) -> usize {
        self.buffers[category.index()].lock().clear()
    }

    pub fn clear_all(&self) -> usize {
        EventCategory::ALL
            .iter()
            .map(|category| self.clear(*category))
            .sum()
    }

    pub fn stats(&self) -> IngestStats {
        IngestStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            console: self.buffers[EventCategory::Console.index()].lock().len(),
            network: self.buffers[EventCategory::Network.index()].lock().len(),
            error: self.buffers[EventCategory::Error.index()].lock().len(),
        }
    }

    /// Drop header maps from network events unless configured to keep them.
    fn shape(&self, category: EventCategory, mut payload: Value) -> Value {
        if category == EventCategory::Network {
            if let Value::Object(map) = &mut payload {
                if !self.settings.include_request_headers {
                    map.remove("requestHeaders");
                }
                if !self.settings.include_response_headers {
                    map.remove("responseHeaders");
                }
            }
        }
        payload
    }
}

/// Cut every string longer than `limit` characters.
pub fn truncate_strings(value: Value, limit: usize) -> Value {
    match value {
        Value::String(text) if text.chars().count() > limit => {
            let mut cut: String = text.chars().take(limit).collect();
            cut.push_str(TRUNCATION_SUFFIX);
            Value::String(cut)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| truncate_strings(item, limit))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, truncate_strings(item, limit)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
#[path = "ingest_tests.rs"]
mod tests;
