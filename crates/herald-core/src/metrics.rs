//! Metrics instrumentation for Herald clients.
//!
//! Recording goes through the `metrics` facade and is a no-op until the
//! embedding application installs a recorder (the `herald-watch` binary
//! installs a Prometheus exporter).

use herald_protocol::ChannelId;
use metrics::{counter, gauge};

/// Metric names.
pub mod names {
    pub const CONNECT_ATTEMPTS_TOTAL: &str = "herald_connect_attempts_total";
    pub const RECONNECTS_SCHEDULED_TOTAL: &str = "herald_reconnects_scheduled_total";
    pub const NOTIFICATIONS_TOTAL: &str = "herald_notifications_total";
    pub const MALFORMED_FRAMES_TOTAL: &str = "herald_malformed_frames_total";
    pub const SESSIONS_OPEN: &str = "herald_sessions_open";
}

/// Describe all metrics to the installed recorder.
pub fn describe() {
    metrics::describe_counter!(
        names::CONNECT_ATTEMPTS_TOTAL,
        "Total number of session establishment attempts"
    );
    metrics::describe_counter!(
        names::RECONNECTS_SCHEDULED_TOTAL,
        "Total number of reconnects scheduled after an unintentional close"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_TOTAL,
        "Total number of notifications delivered to observers"
    );
    metrics::describe_counter!(
        names::MALFORMED_FRAMES_TOTAL,
        "Total number of inbound frames dropped as malformed"
    );
    metrics::describe_gauge!(names::SESSIONS_OPEN, "Current number of open sessions");
}

/// Record a connect attempt.
pub fn record_connect_attempt(channel: ChannelId) {
    counter!(names::CONNECT_ATTEMPTS_TOTAL, "channel" => channel.as_str()).increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect_scheduled(channel: ChannelId) {
    counter!(names::RECONNECTS_SCHEDULED_TOTAL, "channel" => channel.as_str()).increment(1);
}

/// Record a delivered notification.
pub fn record_notification(channel: ChannelId) {
    counter!(names::NOTIFICATIONS_TOTAL, "channel" => channel.as_str()).increment(1);
}

/// Record a dropped malformed frame.
pub fn record_malformed_frame(channel: ChannelId) {
    counter!(names::MALFORMED_FRAMES_TOTAL, "channel" => channel.as_str()).increment(1);
}

/// Metrics guard that tracks an open session until dropped.
pub struct OpenSessionGuard {
    channel: ChannelId,
}

impl OpenSessionGuard {
    /// Create a new guard, recording an open session.
    #[must_use]
    pub fn new(channel: ChannelId) -> Self {
        gauge!(names::SESSIONS_OPEN, "channel" => channel.as_str()).increment(1.0);
        Self { channel }
    }
}

impl Drop for OpenSessionGuard {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_OPEN, "channel" => self.channel.as_str()).decrement(1.0);
    }
}
