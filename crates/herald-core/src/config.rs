//! Client configuration.
//!
//! Defaults follow the reference deployment: one server at
//! `ws://127.0.0.1:8080/ws`, channel selected with `?type=<CHANNEL>`, and a
//! fixed five second delay before every reconnect attempt. `HERALD_HOST` and
//! `HERALD_PORT` override the default host and port.

use herald_protocol::codec::MAX_FRAME_SIZE;
use herald_protocol::endpoint::DEFAULT_CHANNEL_PARAM;
use herald_protocol::{Endpoint, ProtocolError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path of the WebSocket endpoint.
    #[serde(default = "default_path")]
    pub path: String,

    /// Use `wss://` instead of `ws://`.
    #[serde(default)]
    pub secure: bool,

    /// Query parameter carrying the channel name.
    ///
    /// Empty means the channel is not sent (single-channel deployments).
    #[serde(default = "default_channel_param")]
    pub channel_param: String,

    /// Reconnect behavior after an unintentional close.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Period of the optional status poller in milliseconds.
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_ms: u64,

    /// Largest WebSocket message the transport reads, in bytes.
    ///
    /// Frames above the codec limit but below this are dropped as malformed
    /// and the session stays open; a message above this ends the session.
    /// Never lower than [`MAX_FRAME_SIZE`].
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Connect plus handshake timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

/// Floor applied to every reconnect delay.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(1);

/// Reconnect configuration.
///
/// With the default `multiplier` of 1.0 every retry waits exactly
/// `delay_ms`. A larger multiplier turns this into exponential backoff,
/// capped at `max_delay_ms`; the failure count resets once a session opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry in milliseconds.
    #[serde(default = "default_reconnect_delay")]
    pub delay_ms: u64,

    /// Growth factor applied per consecutive failure.
    #[serde(default = "default_reconnect_multiplier")]
    pub multiplier: f64,

    /// Upper bound for the delay in milliseconds.
    #[serde(default = "default_max_reconnect_delay")]
    pub max_delay_ms: u64,
}

// Default value functions
fn default_host() -> String {
    std::env::var("HERALD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("HERALD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_path() -> String {
    "/ws".to_string()
}

fn default_channel_param() -> String {
    DEFAULT_CHANNEL_PARAM.to_string()
}

fn default_status_poll_interval() -> u64 {
    1_000
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024 // 16 MB
}

fn default_connect_timeout() -> u64 {
    10_000
}

fn default_reconnect_delay() -> u64 {
    5_000
}

fn default_reconnect_multiplier() -> f64 {
    1.0
}

fn default_max_reconnect_delay() -> u64 {
    60_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            secure: false,
            channel_param: default_channel_param(),
            reconnect: ReconnectConfig::default(),
            status_poll_interval_ms: default_status_poll_interval(),
            max_message_size: default_max_message_size(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reconnect_delay(),
            multiplier: default_reconnect_multiplier(),
            max_delay_ms: default_max_reconnect_delay(),
        }
    }
}

impl ClientConfig {
    /// The server base URL, without channel parameter.
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}:{}{}", scheme, self.host, self.port, self.path)
    }

    /// Build the endpoint sessions connect to.
    ///
    /// # Errors
    ///
    /// Returns an error if host, port and path do not form a valid URL.
    pub fn endpoint(&self) -> Result<Endpoint, ProtocolError> {
        Endpoint::parse(&self.base_url(), Some(self.channel_param.clone()))
    }

    /// Status poller period.
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    /// Transport message limit, raised to [`MAX_FRAME_SIZE`] if configured
    /// lower.
    #[must_use]
    pub fn transport_message_limit(&self) -> usize {
        self.max_message_size.max(MAX_FRAME_SIZE)
    }

    /// Connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl ReconnectConfig {
    /// A fixed delay between attempts.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        let delay_ms = delay.as_millis() as u64;
        Self {
            delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
        }
    }

    /// Delay before the retry following `failures` consecutive failures.
    ///
    /// Never shorter than [`MIN_RECONNECT_DELAY`], so a zero `delay_ms`
    /// cannot turn the retry loop into a busy loop.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        self.raw_delay_for(failures).max(MIN_RECONNECT_DELAY)
    }

    fn raw_delay_for(&self, failures: u32) -> Duration {
        let multiplier = if self.multiplier.is_finite() && self.multiplier > 1.0 {
            self.multiplier
        } else {
            return Duration::from_millis(self.delay_ms);
        };
        let cap = self.max_delay_ms.max(self.delay_ms) as f64;
        let exponent = i32::try_from(failures).unwrap_or(i32::MAX);
        let delay = (self.delay_ms as f64 * multiplier.powi(exponent)).min(cap);
        Duration::from_millis(delay as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_protocol::ChannelId;

    #[test]
    fn test_default_config() {
        let config = ClientConfig {
            host: "127.0.0.1".into(),
            port: 8080,
            ..ClientConfig::default()
        };
        assert_eq!(config.base_url(), "ws://127.0.0.1:8080/ws");
        assert_eq!(config.reconnect.delay_for(0), Duration::from_secs(5));
        assert_eq!(config.status_poll_interval(), Duration::from_secs(1));

        let endpoint = config.endpoint().unwrap();
        assert_eq!(
            endpoint.url_for(ChannelId::General).as_str(),
            "ws://127.0.0.1:8080/ws?type=GENERAL"
        );
    }

    #[test]
    fn test_fixed_delay_never_grows() {
        let reconnect = ReconnectConfig::default();
        for failures in [0, 1, 5, 100, u32::MAX] {
            assert_eq!(reconnect.delay_for(failures), Duration::from_millis(5_000));
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let reconnect = ReconnectConfig {
            delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
        };
        assert_eq!(reconnect.delay_for(0), Duration::from_secs(1));
        assert_eq!(reconnect.delay_for(1), Duration::from_secs(2));
        assert_eq!(reconnect.delay_for(3), Duration::from_secs(8));
        assert_eq!(reconnect.delay_for(4), Duration::from_secs(10));
        assert_eq!(reconnect.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_delay_is_floored() {
        let reconnect = ReconnectConfig {
            delay_ms: 0,
            multiplier: 2.0,
            max_delay_ms: 0,
        };
        assert_eq!(reconnect.delay_for(0), MIN_RECONNECT_DELAY);
        assert_eq!(reconnect.delay_for(10), MIN_RECONNECT_DELAY);
        assert_eq!(
            ReconnectConfig::fixed(Duration::ZERO).delay_for(3),
            MIN_RECONNECT_DELAY
        );
    }

    #[test]
    fn test_transport_limit_covers_codec_limit() {
        let config = ClientConfig::default();
        assert!(config.transport_message_limit() > MAX_FRAME_SIZE);

        let config = ClientConfig {
            max_message_size: 1024,
            ..ClientConfig::default()
        };
        assert_eq!(config.transport_message_limit(), MAX_FRAME_SIZE);
    }

    #[test]
    fn test_config_from_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"host":"notify.local","port":9000,"channel_param":"","reconnect":{"delay_ms":250}}"#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.reconnect.delay_ms, 250);
        assert_eq!(config.reconnect.multiplier, 1.0);
        assert_eq!(
            config.endpoint().unwrap().url_for(ChannelId::System).as_str(),
            "ws://notify.local:9000/ws"
        );
    }
}
