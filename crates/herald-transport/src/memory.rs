//! In-process transport.
//!
//! [`MemoryTransport`] opens sessions against a [`MemoryServer`] living in
//! the same process. Each accepted session is represented on the server side
//! by a [`MemoryPeer`] that can push messages, fail the session or close it.
//! Connection lifecycles are fully scriptable for the
//! connection manager's tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use url::Url;

use crate::traits::{Session, SessionId, Transport, TransportError};

enum PeerEvent {
    Message(Bytes),
    Fail(String),
}

struct Shared {
    incoming: mpsc::UnboundedSender<MemoryPeer>,
    refusing: AtomicBool,
    attempts: AtomicUsize,
}

/// Client half of an in-process transport.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Server half of an in-process transport.
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a connected transport/server pair.
    #[must_use]
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            incoming: tx,
            refusing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (
            MemoryTransport {
                shared: Arc::clone(&shared),
            },
            MemoryServer {
                incoming: rx,
                shared,
            },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Session>, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);
        let id = SessionId::generate();

        let peer = MemoryPeer {
            id: id.clone(),
            url: url.clone(),
            events: events_tx,
            closed: closed_rx,
        };
        self.shared
            .incoming
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("server is gone".into()))?;

        debug!(session = %id, url = %url, "Memory session established");

        Ok(Box::new(MemorySession {
            id,
            events: events_rx,
            closed: closed_tx,
            is_open: true,
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl MemoryServer {
    /// Wait for the next session.
    ///
    /// Returns `None` once every [`MemoryTransport`] handle is dropped.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Take an already established session, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }

    /// Refuse (or stop refusing) new sessions, as an unreachable server would.
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of connect attempts made so far, refused ones included.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

/// Server-side view of one session.
pub struct MemoryPeer {
    id: SessionId,
    url: Url,
    events: mpsc::UnboundedSender<PeerEvent>,
    closed: watch::Receiver<bool>,
}

impl MemoryPeer {
    /// The session identifier shared with the client half.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The URL the client connected to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Push a text message to the client.
    ///
    /// Returns `false` if the client side is gone.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send_bytes(Bytes::from(text.into()))
    }

    /// Push a raw message to the client.
    pub fn send_bytes(&self, data: impl Into<Bytes>) -> bool {
        self.events.send(PeerEvent::Message(data.into())).is_ok()
    }

    /// Fail the session with a transport error.
    pub fn fail(self, reason: impl Into<String>) {
        let _ = self.events.send(PeerEvent::Fail(reason.into()));
    }

    /// Close the session from the server side.
    pub fn close(self) {
        drop(self);
    }

    /// Whether the client closed the session (or dropped it).
    #[must_use]
    pub fn is_closed_by_client(&self) -> bool {
        *self.closed.borrow() || self.closed.has_changed().is_err()
    }

    /// Wait until the client closes the session (or drops it).
    pub async fn closed(&mut self) {
        let _ = self.closed.wait_for(|closed| *closed).await;
    }
}

struct MemorySession {
    id: SessionId,
    events: mpsc::UnboundedReceiver<PeerEvent>,
    closed: watch::Sender<bool>,
    is_open: bool,
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> &SessionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        match self.events.recv().await {
            Some(PeerEvent::Message(data)) => Ok(Some(data)),
            Some(PeerEvent::Fail(reason)) => {
                self.is_open = false;
                Err(TransportError::ReceiveFailed(reason))
            }
            None => {
                self.is_open = false;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.is_open = false;
        self.events.close();
        self.closed.send_replace(true);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
