//! Notifications delivered to observers.

use herald_protocol::{ChannelId, NotificationFrame};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One notification received on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Channel the notification arrived on.
    pub channel: ChannelId,
    /// Notification text.
    pub message: String,
    /// Epoch milliseconds, from the sender when it provided a valid one,
    /// otherwise the time the frame was received.
    pub timestamp: u64,
}

impl Notification {
    /// Create a notification stamped with the current time.
    #[must_use]
    pub fn new(channel: ChannelId, message: impl Into<String>) -> Self {
        Self {
            channel,
            message: message.into(),
            timestamp: now_ms(),
        }
    }

    /// Build a notification from a decoded frame received at `received_at`.
    #[must_use]
    pub fn from_frame(channel: ChannelId, frame: NotificationFrame, received_at: u64) -> Self {
        Self {
            channel,
            timestamp: frame.timestamp_or(received_at),
            message: frame.message,
        }
    }
}
