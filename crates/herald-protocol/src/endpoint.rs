//! Connection endpoints.
//!
//! A single server URL serves every channel; the channel is selected with a
//! query parameter (`?type=GENERAL` by default).

use url::Url;

use crate::channel::ChannelId;
use crate::codec::ProtocolError;

/// Default query parameter carrying the channel name.
pub const DEFAULT_CHANNEL_PARAM: &str = "type";

/// Server endpoint shared by all channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
    channel_param: Option<String>,
}

impl Endpoint {
    /// Parse a `ws://` or `wss://` base URL.
    ///
    /// With `channel_param` set to `None` the channel is not encoded in the
    /// URL at all, which suits single-channel deployments.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or not a WebSocket URL.
    pub fn parse(base: &str, channel_param: Option<String>) -> Result<Self, ProtocolError> {
        let base = Url::parse(base)?;
        match base.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ProtocolError::InvalidEndpoint(format!(
                    "unsupported scheme '{other}'"
                )))
            }
        }
        if base.host_str().is_none() {
            return Err(ProtocolError::InvalidEndpoint("missing host".into()));
        }
        Ok(Self {
            base,
            channel_param: channel_param.filter(|p| !p.is_empty()),
        })
    }

    /// The base URL without any channel parameter.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The URL a session for `channel` connects to.
    #[must_use]
    pub fn url_for(&self, channel: ChannelId) -> Url {
        let mut url = self.base.clone();
        if let Some(param) = &self.channel_param {
            url.query_pairs_mut().append_pair(param, channel.as_str());
        }
        url
    }
}
