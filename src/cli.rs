//! CLI definitions for TabRelay.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tabrelay_protocols::FilterMode;

/// TabRelay CLI.
#[derive(Parser)]
#[command(name = "tabrelay")]
#[command(about = "Privacy-filtering relay between tool calls and browser extensions")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the relay in foreground (default)
    Run {
        /// Override server host
        #[arg(long)]
        host: Option<String>,

        /// Override server port
        #[arg(long)]
        port: Option<u16>,

        /// Override the initial filter mode
        #[arg(long, value_parser = parse_mode)]
        mode: Option<FilterMode>,
    },

    /// Validate the configuration file and exit
    CheckConfig,

    /// Print the effective configuration as TOML
    PrintConfig,
}

fn parse_mode(raw: &str) -> Result<FilterMode, String> {
    raw.parse::<FilterMode>().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::parse_from(["tabrelay"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn test_run_overrides() {
        let cli = Cli::parse_from([
            "tabrelay", "run", "--port", "4000", "--mode", "hide-all", "-c", "relay.toml",
        ]);
        assert_eq!(cli.config, PathBuf::from("relay.toml"));
        match cli.command {
            Some(Commands::Run { host, port, mode }) => {
                assert_eq!(host, None);
                assert_eq!(port, Some(4000));
                assert_eq!(mode, Some(FilterMode::RedactAll));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_bad_mode_is_rejected() {
        assert!(Cli::try_parse_from(["tabrelay", "run", "--mode", "loud"]).is_err());
    }
}
