//! Connection status tracking.
//!
//! Status is pushed: connections update the tracker exactly when a session
//! opens or closes, and consumers either read the latest snapshot, await
//! changes through a `watch` receiver, or use [`StatusPoller`] for a fixed
//! rate callback over the same state.

use herald_protocol::ChannelId;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Per-channel connected flags at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    channels: BTreeMap<ChannelId, bool>,
}

impl StatusSnapshot {
    /// Whether `channel` currently has an open session.
    #[must_use]
    pub fn is_connected(&self, channel: ChannelId) -> bool {
        self.channels.get(&channel).copied().unwrap_or(false)
    }

    /// Number of channels with an open session.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.channels.values().filter(|c| **c).count()
    }

    /// Iterate over tracked channels and their flags.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, bool)> + '_ {
        self.channels.iter().map(|(c, s)| (*c, *s))
    }
}

/// Push-updated status shared between connections and consumers.
#[derive(Clone)]
pub struct StatusTracker {
    sender: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusTracker {
    /// Create a tracker with no channels.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::default());
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Record a transition. Returns `true` if the flag changed.
    pub fn set(&self, channel: ChannelId, connected: bool) -> bool {
        self.sender.send_if_modified(|snapshot| {
            let previous = snapshot.channels.insert(channel, connected);
            previous != Some(connected)
        })
    }

    /// Stop tracking `channel` altogether.
    pub fn forget(&self, channel: ChannelId) {
        self.sender
            .send_if_modified(|snapshot| snapshot.channels.remove(&channel).is_some());
    }

    /// Stop tracking every channel.
    pub fn forget_all(&self) {
        self.sender.send_if_modified(|snapshot| {
            let changed = !snapshot.channels.is_empty();
            snapshot.channels.clear();
            changed
        });
    }

    /// The latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    /// Whether `channel` is connected according to the latest snapshot.
    #[must_use]
    pub fn is_connected(&self, channel: ChannelId) -> bool {
        self.sender.borrow().is_connected(channel)
    }

    /// A receiver notified on every change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }

    /// Invoke `callback` with the latest snapshot every `period`.
    ///
    /// The first call happens immediately. Polling stops when the returned
    /// poller is dropped.
    pub fn poll<F>(&self, runtime: &Handle, period: Duration, callback: F) -> StatusPoller
    where
        F: Fn(&StatusSnapshot) + Send + 'static,
    {
        let receiver = self.watch();
        let period = period.max(Duration::from_millis(1));
        let task = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let snapshot = receiver.borrow().clone();
                callback(&snapshot);
            }
        });
        debug!(period_ms = period.as_millis() as u64, "Status poller started");
        StatusPoller { task }
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic status callback; stops when dropped.
#[derive(Debug)]
pub struct StatusPoller {
    task: JoinHandle<()>,
}

impl StatusPoller {
    /// Stop polling. Dropping the poller has the same effect.
    pub fn stop(self) {
        self.task.abort();
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_set_reports_changes_only() {
        let tracker = StatusTracker::new();
        assert!(!tracker.is_connected(ChannelId::General));

        assert!(tracker.set(ChannelId::General, true));
        assert!(!tracker.set(ChannelId::General, true));
        assert!(tracker.is_connected(ChannelId::General));
        assert!(tracker.set(ChannelId::General, false));
        assert!(!tracker.is_connected(ChannelId::General));
    }

    #[test]
    fn test_snapshot_and_forget() {
        let tracker = StatusTracker::new();
        tracker.set(ChannelId::General, true);
        tracker.set(ChannelId::System, false);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.connected_count(), 1);
        assert_eq!(
            snapshot.iter().collect::<Vec<_>>(),
            vec![(ChannelId::General, true), (ChannelId::System, false)]
        );

        tracker.forget(ChannelId::General);
        assert_eq!(tracker.snapshot().iter().count(), 1);
        tracker.forget_all();
        assert_eq!(tracker.snapshot(), StatusSnapshot::default());
    }

    #[tokio::test]
    async fn test_watch_sees_transitions() {
        let tracker = StatusTracker::new();
        let mut rx = tracker.watch();

        tracker.set(ChannelId::PaymentFailure, true);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_connected(ChannelId::PaymentFailure));

        // No-op updates do not wake watchers.
        tracker.set(ChannelId::PaymentFailure, true);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_until_dropped() {
        let tracker = StatusTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let poller = {
            let seen = Arc::clone(&seen);
            tracker.poll(&Handle::current(), Duration::from_secs(1), move |s| {
                seen.lock().unwrap().push(s.is_connected(ChannelId::General));
            })
        };

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        tracker.set(ChannelId::General, true);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*seen.lock().unwrap(), vec![false, false, true]);

        poller.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_poller_stops_it() {
        let tracker = StatusTracker::new();
        let ticks = Arc::new(Mutex::new(0));
        let poller = {
            let ticks = Arc::clone(&ticks);
            tracker.poll(&Handle::current(), Duration::from_secs(1), move |_| {
                *ticks.lock().unwrap() += 1;
            })
        };

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(*ticks.lock().unwrap(), 2);

        drop(poller);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*ticks.lock().unwrap(), 2);
    }
}
