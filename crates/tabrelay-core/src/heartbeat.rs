//! Liveness sweeper.
//!
//! Any inbound traffic counts as a sign of life. Connections that stay
//! silent for longer than the timeout are closed with
//! [`CloseReason::HeartbeatTimeout`](tabrelay_protocols::CloseReason::HeartbeatTimeout),
//! which in turn fails their pending operations.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// How often to look for stale connections.
    pub interval: Duration,
    /// Silence longer than this closes the connection.
    pub timeout: Duration,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Run the sweeper until `cancel` fires.
pub fn spawn_sweeper(
    registry: Arc<ConnectionRegistry>,
    settings: HeartbeatSettings,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Heartbeat sweeper started (interval: {:?}, timeout: {:?})",
            settings.interval, settings.timeout
        );

        let mut ticker = time::interval(settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for id in registry.sweep_stale(settings.timeout) {
                        warn!(connection = %id, "Closed silent connection");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("Heartbeat sweeper shutting down");
                    break;
                }
            }
        }
    })
}
