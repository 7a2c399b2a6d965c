//! # Seatsync Server
//!
//! Realtime seat and match synchronization server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! seatsync
//!
//! # Run with a specific config file
//! seatsync --config /path/to/seatsync.toml
//!
//! # Print the effective configuration
//! seatsync --config /path/to/seatsync.toml --print-config
//!
//! # Run with environment overrides
//! SEATSYNC_PORT=8080 SEATSYNC_AUTH__MODE=first-claim seatsync
//! ```

mod adapter;
mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "seatsync")]
#[command(about = "Realtime seat and match synchronization server")]
#[command(version)]
struct Args {
    /// Config file to load instead of the search paths
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatsync=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    tracing::info!("Starting Seatsync server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_config_path() {
        let args = Args::try_parse_from(["seatsync", "--config", "/tmp/seatsync.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/seatsync.toml")));
        assert!(!args.print_config);

        let args = Args::try_parse_from(["seatsync", "-c", "a.toml", "--print-config"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("a.toml")));
        assert!(args.print_config);
    }

    #[test]
    fn test_args_defaults_and_errors() {
        let args = Args::try_parse_from(["seatsync"]).unwrap();
        assert!(args.config.is_none());

        assert!(Args::try_parse_from(["seatsync", "--config"]).is_err());
        assert!(Args::try_parse_from(["seatsync", "--bogus"]).is_err());
    }
}
