//! The client facade.
//!
//! [`Client`] is the single entry point applications use. It is constructed
//! and owned explicitly (there is no process-wide instance) and tears down
//! every connection when shut down or dropped.

use crate::config::ClientConfig;
use crate::connection::{ConnectionContext, Phase};
use crate::message::Notification;
use crate::observer::{ObserverHandle, ObserverRegistry};
use crate::registry::ConnectionRegistry;
use crate::status::{StatusPoller, StatusSnapshot, StatusTracker};
use herald_protocol::{ChannelId, ProtocolError};
use herald_transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Constructed outside a Tokio runtime.
    #[error("Herald client requires a Tokio runtime")]
    NoRuntime,

    /// Endpoint configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Multi-channel notification client.
///
/// Each subscribed channel gets one persistent session that is reopened
/// automatically after unintentional disconnects. Notifications are
/// delivered to the channel's observers in arrival order.
pub struct Client {
    observers: ObserverRegistry,
    status: StatusTracker,
    connections: ConnectionRegistry,
    runtime: Handle,
    config: ClientConfig,
}

impl Client {
    /// Create a client using the WebSocket transport.
    ///
    /// # Errors
    ///
    /// Returns an error outside a Tokio runtime or if the endpoint
    /// configuration is invalid.
    #[cfg(feature = "websocket")]
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        use herald_transport::{WebSocketConfig, WebSocketTransport};

        let transport = WebSocketTransport::new(WebSocketConfig {
            max_message_size: config.transport_message_limit(),
            connect_timeout: config.connect_timeout(),
        });
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over an arbitrary transport.
    ///
    /// # Errors
    ///
    /// Returns an error outside a Tokio runtime or if the endpoint
    /// configuration is invalid.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let endpoint = config.endpoint()?;

        info!(
            endpoint = %endpoint.base(),
            transport = transport.name(),
            reconnect_delay_ms = config.reconnect.delay_ms,
            "Creating client"
        );

        let observers = ObserverRegistry::new();
        let status = StatusTracker::new();
        let connections = ConnectionRegistry::new(ConnectionContext {
            transport,
            endpoint,
            observers: observers.clone(),
            status: status.clone(),
            reconnect: config.reconnect.clone(),
            runtime: runtime.clone(),
        });

        Ok(Self {
            observers,
            status,
            connections,
            runtime,
            config,
        })
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Register `callback` for `channel` and make sure the channel's
    /// connection is opening or open.
    ///
    /// Every call adds an independent registration; the channel keeps a
    /// single session however many observers it has.
    pub fn subscribe<F>(&self, channel: ChannelId, callback: F) -> ObserverHandle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let handle = self.on_message(channel, callback);
        if self.connections.ensure(channel) {
            debug!(channel = %channel, "Subscribed, connection opening");
        }
        handle
    }

    /// Register `callback` for `channel` without touching its connection.
    ///
    /// The callback starts receiving once the channel is subscribed.
    pub fn on_message<F>(&self, channel: ChannelId, callback: F) -> ObserverHandle
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.observers.add(channel, Arc::new(callback))
    }

    /// Stop delivering to one registration; the channel's session and other
    /// observers are unaffected.
    ///
    /// Returns `false` if the registration was already removed.
    pub fn remove_observer(&self, handle: ObserverHandle) -> bool {
        self.observers.remove(handle)
    }

    /// Unsubscribe the whole channel.
    ///
    /// This is channel-wide: the shared session is closed, any pending
    /// reconnect is cancelled and every observer registered for `channel` is
    /// dropped, whoever registered it. To stop only one callback use
    /// [`Client::remove_observer`]. Unsubscribing a channel that is not
    /// subscribed is a no-op.
    pub fn unsubscribe(&self, channel: ChannelId) {
        let closed = self.connections.remove(channel);
        let observers = self.observers.clear_channel(channel);
        self.status.forget(channel);
        if closed || observers > 0 {
            info!(channel = %channel, observers, "Unsubscribed");
        }
    }

    /// Whether `channel` has an open session right now.
    #[must_use]
    pub fn is_connected(&self, channel: ChannelId) -> bool {
        self.connections.status_of(channel)
    }

    /// Lifecycle phase of `channel`'s connection, if it is subscribed.
    #[must_use]
    pub fn phase(&self, channel: ChannelId) -> Option<Phase> {
        self.connections.phase_of(channel)
    }

    /// Channels that currently hold a connection.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelId> {
        self.connections.channels()
    }

    /// Number of observers registered for `channel`.
    #[must_use]
    pub fn observer_count(&self, channel: ChannelId) -> usize {
        self.observers.count(channel)
    }

    /// Latest pushed status of every tracked channel.
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Receiver notified whenever a channel connects or disconnects.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.watch()
    }

    /// Call `callback` with the status snapshot every `period` until the
    /// returned poller is dropped.
    pub fn poll_status<F>(&self, period: Duration, callback: F) -> StatusPoller
    where
        F: Fn(&StatusSnapshot) + Send + 'static,
    {
        self.status.poll(&self.runtime, period, callback)
    }

    /// Close every connection and drop every observer. Idempotent.
    pub fn shutdown(&self) {
        let closed = self.connections.remove_all();
        self.observers.clear();
        self.status.forget_all();
        if closed > 0 {
            info!(connections = closed, "Client shut down");
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
