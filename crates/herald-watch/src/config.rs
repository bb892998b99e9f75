//! Watcher configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`herald.toml`, `/etc/herald/herald.toml`,
//!   `~/.config/herald/herald.toml`, or an explicit path)
//! - Environment variables (`HERALD_CLIENT__PORT`, `HERALD_CHANNELS`, ...)

use anyhow::{Context, Result};
use herald_core::{ChannelId, ClientConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Watcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Connection manager settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Channels to subscribe to.
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelId>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable the Prometheus exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_channels() -> Vec<ChannelId> {
    vec![ChannelId::General]
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client: ClientConfig::default(),
            channels: default_channels(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first default path that exists, with
    /// `HERALD_*` environment variables layered on top.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "herald.toml",
            "/etc/herald/herald.toml",
            "~/.config/herald/herald.toml",
        ];

        let file = config_paths
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists());

        let mut builder = config::Config::builder();
        if let Some(path) = &file {
            tracing::debug!(path = %path.display(), "Using config file");
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder
            .add_source(
                config::Environment::with_prefix("HERALD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("channels"),
            )
            .build()
            .context("Failed to load configuration")?
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}
