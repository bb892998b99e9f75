//! Per-channel connection lifecycle.
//!
//! A [`Connection`] owns at most one transport session for its channel and
//! at most one pending reconnect timer, never both. Its phases:
//!
//! ```text
//!            open()                 session up
//!   Idle ────────────▶ Connecting ─────────────▶ Open
//!                          ▲   │ connect failed    │ peer close / error
//!                          │   ▼                   ▼
//!                          └── RetryScheduled ◀────┘
//!                  backoff elapsed
//!
//!   close() from any phase ──▶ Closed   (timer cancelled, no retry)
//! ```
//!
//! The session (connect plus read loop) runs as a single task, so all
//! transport events of one channel are handled sequentially. Every
//! transition is made under the connection's lock and tagged with an epoch;
//! a session or timer whose epoch is stale after `close()` can no longer
//! change state, which is what prevents a torn-down channel from being
//! reopened by a late reconnect.

use crate::config::ReconnectConfig;
use crate::message::{now_ms, Notification};
use crate::metrics::{self, OpenSessionGuard};
use crate::observer::ObserverRegistry;
use crate::status::StatusTracker;
use herald_protocol::{codec, ChannelId, Endpoint};
use herald_transport::{Session, Transport};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Never opened.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// The session is established.
    Open,
    /// The session was lost; a reconnect timer is pending.
    RetryScheduled,
    /// Explicitly closed; inert until opened again.
    Closed,
}

/// Everything a connection needs from its owner.
#[derive(Clone)]
pub(crate) struct ConnectionContext {
    pub transport: Arc<dyn Transport>,
    pub endpoint: Endpoint,
    pub observers: ObserverRegistry,
    pub status: StatusTracker,
    pub reconnect: ReconnectConfig,
    pub runtime: Handle,
}

/// Client-side state and session for one channel.
#[derive(Clone)]
pub(crate) struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    channel: ChannelId,
    url: Url,
    ctx: ConnectionContext,
    state: Mutex<State>,
}

struct State {
    phase: Phase,
    epoch: u64,
    failures: u32,
    session: Option<SessionHandle>,
    retry: Option<JoinHandle<()>>,
}

struct SessionHandle {
    shutdown: oneshot::Sender<()>,
    _task: JoinHandle<()>,
}

impl Connection {
    /// Create an idle connection for `channel`.
    pub fn new(channel: ChannelId, ctx: ConnectionContext) -> Self {
        let url = ctx.endpoint.url_for(channel);
        Self {
            inner: Arc::new(Inner {
                channel,
                url,
                ctx,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    epoch: 0,
                    failures: 0,
                    session: None,
                    retry: None,
                }),
            }),
        }
    }

    /// The channel this connection serves.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.inner.channel
    }

    /// The URL sessions connect to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.inner.lock().phase
    }

    /// Whether the session is established right now.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.phase() == Phase::Open
    }

    /// Start a session unless one is already connecting or open.
    ///
    /// A pending reconnect timer is superseded by the new attempt.
    pub fn open(&self) {
        let mut state = self.inner.lock();
        if state.session.is_some() {
            trace!(channel = %self.inner.channel, phase = ?state.phase, "Open ignored, session exists");
            return;
        }
        if let Some(retry) = state.retry.take() {
            retry.abort();
        }
        self.inner.begin_session(&mut state);
    }

    /// Close the session and cancel any pending reconnect.
    ///
    /// The close is intentional, so no reconnect follows. Idempotent.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.epoch += 1;

        let had_session = match state.session.take() {
            Some(session) => {
                // The session task performs the graceful close and exits.
                let _ = session.shutdown.send(());
                true
            }
            None => false,
        };
        let had_retry = match state.retry.take() {
            Some(retry) => {
                retry.abort();
                true
            }
            None => false,
        };

        if state.phase != Phase::Closed {
            debug!(
                channel = %self.inner.channel,
                from = ?state.phase,
                had_session,
                had_retry,
                "Connection closed"
            );
        }
        state.phase = Phase::Closed;
        state.failures = 0;
        self.inner.ctx.status.set(self.inner.channel, false);
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_session(self: &Arc<Self>, state: &mut State) {
        state.epoch += 1;
        state.phase = Phase::Connecting;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = self
            .ctx
            .runtime
            .spawn(Arc::clone(self).run_session(state.epoch, shutdown_rx));
        state.session = Some(SessionHandle {
            shutdown: shutdown_tx,
            _task: task,
        });
    }

    async fn run_session(self: Arc<Self>, epoch: u64, mut shutdown: oneshot::Receiver<()>) {
        metrics::record_connect_attempt(self.channel);
        debug!(channel = %self.channel, url = %self.url, transport = self.ctx.transport.name(), "Connecting");

        let connect = self.ctx.transport.connect(&self.url);
        let mut session = tokio::select! {
            biased;

            _ = &mut shutdown => {
                debug!(channel = %self.channel, "Connect attempt cancelled");
                return;
            }

            result = connect => match result {
                Ok(session) => session,
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Connect failed");
                    self.on_session_lost(epoch);
                    return;
                }
            },
        };

        if !self.on_session_open(epoch, &*session) {
            let _ = session.close().await;
            return;
        }
        let _metrics_guard = OpenSessionGuard::new(self.channel);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    if let Err(e) = session.close().await {
                        debug!(channel = %self.channel, error = %e, "Close handshake failed");
                    }
                    return;
                }

                frame = session.recv() => match frame {
                    Ok(Some(data)) => self.deliver(&data),
                    Ok(None) => {
                        info!(channel = %self.channel, session = %session.id(), "Session closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!(channel = %self.channel, session = %session.id(), error = %e, "Transport error");
                        break;
                    }
                },
            }
        }

        self.on_session_lost(epoch);
    }

    fn on_session_open(&self, epoch: u64, session: &dyn Session) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch || state.phase != Phase::Connecting {
            return false;
        }

        state.phase = Phase::Open;
        state.failures = 0;
        if let Some(retry) = state.retry.take() {
            retry.abort();
        }
        self.ctx.status.set(self.channel, true);

        info!(channel = %self.channel, session = %session.id(), "Connected");
        true
    }

    fn on_session_lost(self: &Arc<Self>, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch {
            return;
        }

        state.session = None;
        state.phase = Phase::RetryScheduled;
        self.ctx.status.set(self.channel, false);

        let delay = self.ctx.reconnect.delay_for(state.failures);
        state.failures = state.failures.saturating_add(1);

        let inner = Arc::clone(self);
        state.retry = Some(self.ctx.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.retry(epoch);
        }));

        metrics::record_reconnect_scheduled(self.channel);
        info!(
            channel = %self.channel,
            delay_ms = delay.as_millis() as u64,
            failures = state.failures,
            "Disconnected, reconnect scheduled"
        );
    }

    fn retry(self: &Arc<Self>, epoch: u64) {
        let mut state = self.lock();
        if state.epoch != epoch || state.phase != Phase::RetryScheduled {
            return;
        }

        // This task is the timer; let it finish on its own.
        drop(state.retry.take());
        debug!(channel = %self.channel, "Reconnecting");
        self.begin_session(&mut state);
    }

    fn deliver(&self, data: &[u8]) {
        let frame = match codec::decode(data) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %self.channel, error = %e, bytes = data.len(), "Dropping malformed frame");
                metrics::record_malformed_frame(self.channel);
                return;
            }
        };

        let notification = Notification::from_frame(self.channel, frame, now_ms());
        let observers = self.ctx.observers.notify(&notification);
        metrics::record_notification(self.channel);
        trace!(channel = %self.channel, observers, "Notification delivered");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_transport::{MemoryServer, MemoryTransport};
    use std::time::Duration;
    use tokio::sync::mpsc;

    const BACKOFF: Duration = Duration::from_secs(5);

    fn setup(channel: ChannelId) -> (Connection, MemoryServer, ConnectionContext) {
        let (transport, server) = MemoryTransport::pair();
        let ctx = ConnectionContext {
            transport: Arc::new(transport),
            endpoint: Endpoint::parse("ws://localhost:8080/ws", Some("type".into())).unwrap(),
            observers: ObserverRegistry::new(),
            status: StatusTracker::new(),
            reconnect: ReconnectConfig::fixed(BACKOFF),
            runtime: Handle::current(),
        };
        (Connection::new(channel, ctx.clone()), server, ctx)
    }

    async fn wait_for_phase(conn: &Connection, phase: Phase) {
        for _ in 0..100 {
            if conn.phase() == phase {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("connection never reached {phase:?}, stuck in {:?}", conn.phase());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_connects_to_channel_url() {
        let (conn, mut server, ctx) = setup(ChannelId::PaymentFailure);
        assert_eq!(conn.phase(), Phase::Idle);

        conn.open();
        assert_eq!(conn.phase(), Phase::Connecting);

        let peer = server.accept().await.unwrap();
        assert_eq!(peer.url().as_str(), "ws://localhost:8080/ws?type=PAYMENT_FAILURE");

        wait_for_phase(&conn, Phase::Open).await;
        assert!(conn.is_open());
        assert!(ctx.status.is_connected(ChannelId::PaymentFailure));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_is_idempotent() {
        let (conn, mut server, _ctx) = setup(ChannelId::General);

        conn.open();
        conn.open();
        let _peer = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;
        conn.open();

        tokio::time::sleep(BACKOFF * 2).await;
        assert_eq!(server.connect_attempts(), 1);
        assert!(server.try_accept().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_are_delivered_in_order() {
        let (conn, mut server, ctx) = setup(ChannelId::General);
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.observers.add(
            ChannelId::General,
            Arc::new(move |n: &Notification| {
                let _ = tx.send(n.clone());
            }),
        );

        conn.open();
        let peer = server.accept().await.unwrap();
        peer.send_text(r#"{"message":"first","timestamp":1700000000000}"#);
        peer.send_text("{not json");
        peer.send_text(r#"{"message":"second"}"#);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message, "first");
        assert_eq!(first.timestamp, 1_700_000_000_000);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.message, "second");
        assert!(second.timestamp > 0);

        assert!(rx.try_recv().is_err());
        assert!(conn.is_open());
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_frame_is_dropped_without_reconnect() {
        let (conn, mut server, ctx) = setup(ChannelId::PaymentSuccess);
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.observers.add(
            ChannelId::PaymentSuccess,
            Arc::new(move |n: &Notification| {
                let _ = tx.send(n.clone());
            }),
        );

        conn.open();
        let peer = server.accept().await.unwrap();
        let oversized = format!(r#"{{"message":"{}"}}"#, "x".repeat(codec::MAX_FRAME_SIZE));
        assert!(peer.send_text(oversized));
        assert!(peer.send_text(r#"{"message":"after"}"#));

        assert_eq!(rx.recv().await.unwrap().message, "after");
        tokio::time::sleep(BACKOFF * 2).await;
        assert!(rx.try_recv().is_err());
        assert!(conn.is_open());
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peer_close_schedules_single_retry() {
        let (conn, mut server, ctx) = setup(ChannelId::General);

        conn.open();
        let peer = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;

        let closed_at = tokio::time::Instant::now();
        peer.close();
        wait_for_phase(&conn, Phase::RetryScheduled).await;
        assert!(!ctx.status.is_connected(ChannelId::General));

        let _peer = server.accept().await.unwrap();
        assert!(closed_at.elapsed() >= BACKOFF);
        wait_for_phase(&conn, Phase::Open).await;
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_is_recovered() {
        let (conn, mut server, _ctx) = setup(ChannelId::System);

        conn.open();
        server.accept().await.unwrap().fail("connection reset");
        wait_for_phase(&conn, Phase::RetryScheduled).await;

        let _peer = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_server_keeps_retrying() {
        let (conn, server, _ctx) = setup(ChannelId::General);
        server.set_refusing(true);

        conn.open();
        wait_for_phase(&conn, Phase::RetryScheduled).await;
        assert_eq!(server.connect_attempts(), 1);

        tokio::time::sleep(BACKOFF - Duration::from_millis(1)).await;
        assert_eq!(server.connect_attempts(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(server.connect_attempts(), 2);

        tokio::time::sleep(BACKOFF).await;
        assert_eq!(server.connect_attempts(), 3);
        assert_eq!(conn.phase(), Phase::RetryScheduled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_retry() {
        let (conn, server, ctx) = setup(ChannelId::General);
        server.set_refusing(true);

        conn.open();
        wait_for_phase(&conn, Phase::RetryScheduled).await;

        conn.close();
        assert_eq!(conn.phase(), Phase::Closed);
        assert!(!ctx.status.is_connected(ChannelId::General));

        tokio::time::sleep(BACKOFF * 3).await;
        assert_eq!(server.connect_attempts(), 1);
        assert_eq!(conn.phase(), Phase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_open_session_suppresses_retry() {
        let (conn, mut server, _ctx) = setup(ChannelId::General);

        conn.open();
        let mut peer = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;

        conn.close();
        conn.close();
        peer.closed().await;
        assert!(peer.is_closed_by_client());

        tokio::time::sleep(BACKOFF * 3).await;
        assert_eq!(server.connect_attempts(), 1);
        assert_eq!(conn.phase(), Phase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_after_close() {
        let (conn, mut server, _ctx) = setup(ChannelId::General);

        conn.open();
        let _first = server.accept().await.unwrap();
        conn.close();

        conn.open();
        let _second = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_after_successful_open() {
        let (transport, mut server) = MemoryTransport::pair();
        let ctx = ConnectionContext {
            transport: Arc::new(transport),
            endpoint: Endpoint::parse("ws://localhost:8080/ws", None).unwrap(),
            observers: ObserverRegistry::new(),
            status: StatusTracker::new(),
            reconnect: ReconnectConfig {
                delay_ms: 1_000,
                multiplier: 2.0,
                max_delay_ms: 60_000,
            },
            runtime: Handle::current(),
        };
        let conn = Connection::new(ChannelId::General, ctx);
        server.set_refusing(true);

        conn.open();
        wait_for_phase(&conn, Phase::RetryScheduled).await;
        // Retries at 1s and 1s + 2s.
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(server.connect_attempts(), 3);

        server.set_refusing(false);
        // Third retry waits 4s.
        let peer = server.accept().await.unwrap();
        wait_for_phase(&conn, Phase::Open).await;

        let lost_at = tokio::time::Instant::now();
        peer.close();
        let _peer = server.accept().await.unwrap();
        let waited = lost_at.elapsed();
        assert!(waited >= Duration::from_secs(1) && waited < Duration::from_secs(2));
    }
}
