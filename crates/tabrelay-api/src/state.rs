//! Application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tabrelay_config::Config;
use tabrelay_core::Relay;

/// Timeout bounds applied to `/operations` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationLimits {
    /// Used when a call does not name a timeout.
    pub default_timeout: Duration,
    /// Larger requested timeouts are clamped to this.
    pub max_timeout: Duration,
}

impl OperationLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            default_timeout: config.relay.default_timeout(),
            max_timeout: config.relay.max_timeout(),
        }
    }

    /// Resolve the timeout for one call. `None` means the caller asked for
    /// a zero timeout.
    pub fn resolve(&self, requested_ms: Option<u64>) -> Option<Duration> {
        match requested_ms {
            None => Some(self.default_timeout),
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms).min(self.max_timeout)),
        }
    }
}

impl Default for OperationLimits {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub relay: Arc<Relay>,
    pub limits: OperationLimits,
    /// Capacity of each extension connection's outbound queue.
    pub outbound_queue: usize,
    start_time: Instant,
    operation_count: AtomicU64,
}

impl AppState {
    pub fn new(relay: Arc<Relay>, limits: OperationLimits, outbound_queue: usize) -> Self {
        Self {
            relay,
            limits,
            outbound_queue,
            start_time: Instant::now(),
            operation_count: AtomicU64::new(0),
        }
    }

    pub fn from_config(relay: Arc<Relay>, config: &Config) -> Self {
        Self::new(
            relay,
            OperationLimits::from_config(config),
            config.relay.outbound_queue,
        )
    }

    /// Get uptime.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Operations accepted through `/operations` so far.
    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::Relaxed)
    }

    pub fn record_operation(&self) {
        self.operation_count.fetch_add(1, Ordering::Relaxed);
    }
}
