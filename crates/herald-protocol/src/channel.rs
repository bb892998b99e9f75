//! Channel identifiers.
//!
//! Every channel is an independent notification topic served over its own
//! session. The set is closed: clients and servers agree on it at build time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::ProtocolError;

/// A notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelId {
    /// General-purpose announcements.
    General,
    /// Failed payment events.
    PaymentFailure,
    /// Successful payment events.
    PaymentSuccess,
    /// Operational notices from the platform itself.
    System,
}

impl ChannelId {
    /// Every known channel, in declaration order.
    pub const ALL: [ChannelId; 4] = [
        ChannelId::General,
        ChannelId::PaymentFailure,
        ChannelId::PaymentSuccess,
        ChannelId::System,
    ];

    /// The wire name used in connection URLs and configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelId::General => "GENERAL",
            ChannelId::PaymentFailure => "PAYMENT_FAILURE",
            ChannelId::PaymentSuccess => "PAYMENT_SUCCESS",
            ChannelId::System => "SYSTEM",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChannelId::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ProtocolError::UnknownChannel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_wire_names() {
        assert_eq!(ChannelId::General.as_str(), "GENERAL");
        assert_eq!(ChannelId::PaymentFailure.to_string(), "PAYMENT_FAILURE");
    }

    #[test]
    fn test_channel_from_str() {
        assert_eq!("GENERAL".parse::<ChannelId>().unwrap(), ChannelId::General);
        assert_eq!(
            "payment_failure".parse::<ChannelId>().unwrap(),
            ChannelId::PaymentFailure
        );
        assert!(matches!(
            "LOBBY".parse::<ChannelId>(),
            Err(ProtocolError::UnknownChannel(name)) if name == "LOBBY"
        ));
    }

    #[test]
    fn test_channel_serde_uses_wire_name() {
        let json = serde_json::to_string(&ChannelId::PaymentSuccess).unwrap();
        assert_eq!(json, "\"PAYMENT_SUCCESS\"");

        let parsed: Vec<ChannelId> = serde_json::from_str(r#"["SYSTEM","GENERAL"]"#).unwrap();
        assert_eq!(parsed, vec![ChannelId::System, ChannelId::General]);
    }
}
