//! Relay server: binds the listener, runs the heartbeat sweeper and
//! shuts everything down in order.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tabrelay_config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ServerError;
use crate::http::routes::create_router;
use crate::state::AppState;

/// Listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.server.host.clone(), config.server.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct RelayServer {
    settings: ServerSettings,
    state: Arc<AppState>,
}

impl RelayServer {
    pub fn new(settings: ServerSettings, state: Arc<AppState>) -> Self {
        Self { settings, state }
    }

    /// Get the server address.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr();
        let socket: SocketAddr = addr
            .parse()
            .map_err(|_| ServerError::InvalidAddress(addr.clone()))?;
        let listener = TcpListener::bind(socket)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Once `shutdown` resolves the listener stops accepting, in-flight
    /// HTTP calls run to completion, and then every extension connection
    /// is drained and closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr()?;
        let app = create_router(self.state.clone());

        let heartbeat_cancel = CancellationToken::new();
        let heartbeat = self.state.relay.spawn_heartbeat(heartbeat_cancel.clone());

        info!("Relay listening on {}", local);
        info!("Extension endpoint: ws://{}/extension", local);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await;

        info!("HTTP server stopped, closing extension connections");
        self.state.relay.shutdown().await;
        heartbeat_cancel.cancel();
        let _ = heartbeat.await;

        served.map_err(ServerError::from)
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
