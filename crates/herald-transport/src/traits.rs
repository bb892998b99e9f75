//! Transport abstraction traits for Herald.
//!
//! These traits define the interface every client transport must provide,
//! allowing the connection manager to be transport-agnostic.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use url::Url;

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a transport session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process-unique session ID.
    #[must_use]
    pub fn generate() -> Self {
        let n = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("sess_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish a session.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Session establishment timed out.
    #[error("Connection timed out")]
    Timeout,

    /// Session was already closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// A transport that can open client sessions.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a session to `url`.
    ///
    /// Resolves once the session is established, i.e. ready to receive.
    async fn connect(&self, url: &Url) -> Result<Box<dyn Session>, TransportError>;

    /// Get the transport name (e.g., "websocket", "memory").
    fn name(&self) -> &'static str;
}

/// An established session.
///
/// Sessions are receive-oriented: the server pushes messages, the client
/// only reads them and eventually closes.
#[async_trait]
pub trait Session: Send {
    /// Get the session's unique identifier.
    fn id(&self) -> &SessionId;

    /// Receive the next message payload.
    ///
    /// Returns `None` if the session was closed by the peer.
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    /// Close the session gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Check if the session is still open.
    fn is_open(&self) -> bool;
}
