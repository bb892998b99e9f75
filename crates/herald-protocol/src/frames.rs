//! Frame types for the Herald protocol.
//!
//! Servers push one JSON object per notification. Only `message` is
//! required; a sender may attach its own `timestamp` in epoch milliseconds.

use serde::{Deserialize, Deserializer, Serialize};

/// A notification frame as sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFrame {
    /// Notification text.
    pub message: String,
    /// Sender-assigned timestamp in epoch milliseconds.
    ///
    /// Anything other than a positive integer is treated as absent.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub timestamp: Option<u64>,
}

impl NotificationFrame {
    /// Create a frame without a timestamp.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: None,
        }
    }

    /// Attach a sender timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// The sender timestamp, or `now` when the sender did not provide one.
    #[must_use]
    pub fn timestamp_or(&self, now: u64) -> u64 {
        self.timestamp.unwrap_or(now)
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64()).filter(|ts| *ts > 0))
}
