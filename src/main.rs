//! TabRelay - request broker and privacy-filtering relay.
//!
//! Main entry point for the TabRelay CLI and server.

mod cli;
mod server;

use clap::Parser;
use tabrelay_config::{Config, ConfigLoader, ConfigValidator};

use cli::{Cli, Commands};
use server::{init_tracing, run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = ConfigLoader::load_or_default(&cli.config)?;

    match cli.command {
        None => {
            init_tracing(&config.logging)?;
            run_server(config).await
        }
        Some(Commands::Run { host, port, mode }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(mode) = mode {
                config.privacy.mode = mode;
            }
            init_tracing(&config.logging)?;
            run_server(config).await
        }
        Some(Commands::CheckConfig) => check_config(&config),
        Some(Commands::PrintConfig) => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn check_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let result = ConfigValidator::validate(config);
    for warning in &result.warnings {
        println!("warning: {}: {}", warning.path, warning.message);
    }
    for error in &result.errors {
        println!("error: {}: {}", error.path, error.message);
    }
    if result.is_valid() {
        println!("Configuration OK");
        Ok(())
    } else {
        Err(format!("{} configuration error(s)", result.errors.len()).into())
    }
}
