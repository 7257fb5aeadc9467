//! Tracing setup and relay startup.

use std::sync::{Arc, OnceLock};

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tabrelay_api::{AppState, RelayServer, ServerSettings, shutdown_signal};
use tabrelay_config::{Config, ConfigValidator, LoggingConfig};
use tabrelay_core::{Relay, RelaySettings};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing with console and, when enabled, daily rolling file output.
///
/// `RUST_LOG` overrides the default `info` filter.
pub(crate) fn init_tracing(logging: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = if logging.file {
        let log_dir = logging.resolved_directory();
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("tabrelay")
            .filename_suffix("log")
            .max_log_files(14)
            .build(&log_dir)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        Some(fmt::layer().with_writer(non_blocking).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        // Console goes to stderr so stdout stays free for command output.
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Run the relay until Ctrl+C or SIGTERM.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting TabRelay v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate(&config);
    for warning in &validation.warnings {
        warn!("Config {}: {}", warning.path, warning.message);
    }
    if !validation.is_valid() {
        let errors: Vec<String> = validation
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        return Err(format!("Invalid configuration: {}", errors.join("; ")).into());
    }

    let relay = Arc::new(Relay::new(RelaySettings::from_config(&config))?);
    info!(
        mode = %relay.mode(),
        policy = ?config.relay.selection_policy,
        "Relay initialized"
    );

    let state = Arc::new(AppState::from_config(relay, &config));
    let server = RelayServer::new(ServerSettings::from_config(&config), state);
    server.run(shutdown_signal()).await?;

    info!("TabRelay stopped");
    Ok(())
}
