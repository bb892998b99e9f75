//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client transport using tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_with_config,
    tungstenite::{protocol::WebSocketConfig as TungsteniteConfig, Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};
use url::Url;

use crate::traits::{Session, SessionId, Transport, TransportError};

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Maximum message size in bytes. A larger message is a receive error
    /// and ends the session.
    pub max_message_size: usize,
    /// Upper bound on TCP connect plus handshake.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_message_size: 16 * 1024 * 1024, // 16 MB
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// WebSocket client transport.
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    /// Create a new WebSocket transport.
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    fn tungstenite_config(&self) -> TungsteniteConfig {
        let mut config = TungsteniteConfig::default();
        config.max_message_size = Some(self.config.max_message_size);
        config.max_frame_size = Some(self.config.max_message_size);
        config
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Session>, TransportError> {
        debug!("Connecting to {}", url);

        let handshake =
            connect_async_with_config(url.as_str(), Some(self.tungstenite_config()), false);
        let (stream, response) = tokio::time::timeout(self.config.connect_timeout, handshake)
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| {
                debug!("WebSocket handshake with {} failed: {}", url, e);
                TransportError::ConnectFailed(e.to_string())
            })?;

        debug!(
            "WebSocket handshake completed with {}, status: {}",
            url,
            response.status()
        );

        Ok(Box::new(WebSocketSession::new(stream)))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A WebSocket client session.
pub struct WebSocketSession {
    id: SessionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    is_open: bool,
}

impl WebSocketSession {
    fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            id: SessionId::generate(),
            stream,
            is_open: true,
        }
    }
}

#[async_trait]
impl Session for WebSocketSession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::from(text)));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(Bytes::from(data)));
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!("Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {
                    // Ignore pong messages
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(session = %self.id, ?frame, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Ok(Message::Frame(_))) => {
                    // Raw frame, ignore
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) => {
                    debug!(session = %self.id, "Connection closed");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(session = %self.id, "WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
                None => {
                    debug!(session = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::Other(format!("Failed to close: {}", e)))
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
