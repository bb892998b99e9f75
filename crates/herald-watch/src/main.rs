//! # Herald Watch
//!
//! Subscribes to Herald notification channels and prints every notification
//! as one JSON line on stdout.
//!
//! ## Usage
//!
//! ```bash
//! # Watch GENERAL on the default server
//! herald-watch
//!
//! # Run with custom config
//! herald-watch --config /path/to/herald.toml
//!
//! # Run with environment variables
//! HERALD_HOST=notify.internal HERALD_CHANNELS=PAYMENT_FAILURE,SYSTEM herald-watch
//! ```

mod config;
mod metrics;

use anyhow::Result;
use clap::Parser;
use herald_core::{Client, Notification, StatusSnapshot};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Print Herald channel notifications as JSON lines
#[derive(Parser, Debug)]
#[command(name = "herald-watch", version, about, long_about = None)]
struct Args {
    /// Config file (defaults to herald.toml, /etc/herald/herald.toml or
    /// ~/.config/herald/herald.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald_watch=info,herald_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    let config = match args.config {
        Some(path) => config::Config::from_file(path)?,
        None => config::Config::load()?,
    };

    if config.metrics.enabled {
        metrics::start_metrics_server(config.metrics.port)?;
        metrics::init_metrics();
    }

    let client = Client::new(config.client.clone())?;
    info!(
        endpoint = %client.config().base_url(),
        channels = ?config.channels,
        "Starting Herald watch"
    );

    for channel in &config.channels {
        client.subscribe(*channel, print_notification);
    }

    let mut status = client.watch_status();
    let status_task = tokio::spawn(async move {
        let mut previous = StatusSnapshot::default();
        while status.changed().await.is_ok() {
            let snapshot = status.borrow_and_update().clone();
            for (channel, connected) in snapshot.iter() {
                if previous.is_connected(channel) == connected {
                    continue;
                }
                if connected {
                    info!(channel = %channel, "Channel connected");
                } else {
                    warn!(channel = %channel, "Channel disconnected");
                }
            }
            previous = snapshot;
        }
    });

    let _poller = client.poll_status(config.client.status_poll_interval(), |snapshot| {
        debug!(
            connected = snapshot.connected_count(),
            tracked = snapshot.iter().count(),
            "Status"
        );
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    client.shutdown();
    status_task.abort();

    Ok(())
}

fn print_notification(notification: &Notification) {
    match serde_json::to_string(notification) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize notification"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_config_flag() {
        let args =
            Args::try_parse_from(["herald-watch", "--config", "/etc/herald.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/etc/herald.toml")));

        let args = Args::try_parse_from(["herald-watch", "-c", "local.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("local.toml")));

        let args = Args::try_parse_from(["herald-watch"]).unwrap();
        assert!(args.config.is_none());
    }

    #[test]
    fn test_unexpected_argument_is_rejected() {
        assert!(Args::try_parse_from(["herald-watch", "extra"]).is_err());
        assert!(Args::try_parse_from(["herald-watch", "--config"]).is_err());
    }
}
