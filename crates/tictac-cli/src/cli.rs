//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Data directory for session and stats snapshots
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the WebSocket gateway
    Serve {
        /// Listen address, overriding the configured one
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// List the unfinished sessions of one user
    Sessions {
        /// User id
        #[arg(short, long)]
        user: u64,
    },
    /// Show stored win/loss/draw counters
    Stats {
        /// Only show this user id
        #[arg(short, long)]
        user: Option<u64>,
    },
    /// Load and validate the configuration, then print a summary
    CheckConfig,
    /// Print an example configuration file
    ExampleConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "tictac",
            "--verbose",
            "--data-dir",
            "/tmp/tictac",
            "serve",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/tictac")));
        assert!(matches!(cli.command, Commands::Serve { bind: Some(ref b) } if b == "0.0.0.0:9000"));
    }

    #[test]
    fn test_sessions_requires_user() {
        assert!(Cli::try_parse_from(["tictac", "sessions"]).is_err());
        let cli = Cli::try_parse_from(["tictac", "sessions", "--user", "7"]).unwrap();
        assert!(matches!(cli.command, Commands::Sessions { user: 7 }));
    }
}
