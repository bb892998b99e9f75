//! Per-channel observer registry.
//!
//! Observers are kept in registration order per channel. Each list is stored
//! as an immutable snapshot that is replaced on every change, so a delivery
//! in progress keeps iterating the list it started with: registrations added
//! or removed while it runs only affect later deliveries.

use crate::message::Notification;
use dashmap::DashMap;
use herald_protocol::ChannelId;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, trace};

/// An observer callback.
pub type Observer = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Opaque handle identifying one observer registration.
///
/// Removal goes by handle, never by comparing callbacks, so registering the
/// same closure twice yields two independently removable registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverHandle {
    channel: ChannelId,
    id: u64,
}

impl ObserverHandle {
    /// The channel this registration belongs to.
    #[must_use]
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl fmt::Display for ObserverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.channel, self.id)
    }
}

#[derive(Clone)]
struct Entry {
    id: u64,
    observer: Observer,
}

/// Registry of observers keyed by channel.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    channels: Arc<DashMap<ChannelId, Arc<Vec<Entry>>>>,
    next_id: Arc<AtomicU64>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer to the end of `channel`'s list.
    pub fn add(&self, channel: ChannelId, observer: Observer) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entry = self.channels.entry(channel).or_default();
        let mut list = Vec::with_capacity(entry.len() + 1);
        list.extend(entry.iter().cloned());
        list.push(Entry { id, observer });
        *entry = Arc::new(list);

        trace!(channel = %channel, observer = id, observers = entry.len(), "Observer added");
        ObserverHandle { channel, id }
    }

    /// Remove one registration.
    ///
    /// Returns `false` if it was already removed.
    pub fn remove(&self, handle: ObserverHandle) -> bool {
        let Some(mut entry) = self.channels.get_mut(&handle.channel) else {
            return false;
        };
        let Some(position) = entry.iter().position(|e| e.id == handle.id) else {
            return false;
        };

        let mut list: Vec<Entry> = entry.iter().cloned().collect();
        list.remove(position);
        *entry = Arc::new(list);

        trace!(channel = %handle.channel, observer = handle.id, "Observer removed");
        true
    }

    /// Drop every registration for `channel`.
    ///
    /// Returns the number of registrations removed.
    pub fn clear_channel(&self, channel: ChannelId) -> usize {
        self.channels
            .remove(&channel)
            .map(|(_, list)| list.len())
            .unwrap_or(0)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.channels.clear();
    }

    /// Number of observers registered for `channel`.
    #[must_use]
    pub fn count(&self, channel: ChannelId) -> usize {
        self.channels.get(&channel).map(|l| l.len()).unwrap_or(0)
    }

    /// Deliver a notification to every observer of its channel, in
    /// registration order.
    ///
    /// A panicking observer is logged and skipped; the remaining observers
    /// still run. Returns the number of observers invoked.
    pub fn notify(&self, notification: &Notification) -> usize {
        let snapshot = self
            .channels
            .get(&notification.channel)
            .map(|list| Arc::clone(list.value()));
        let Some(snapshot) = snapshot else {
            return 0;
        };

        for entry in snapshot.iter() {
            let result = catch_unwind(AssertUnwindSafe(|| (entry.observer)(notification)));
            if result.is_err() {
                error!(
                    channel = %notification.channel,
                    observer = entry.id,
                    "Observer panicked during delivery"
                );
            }
        }

        snapshot.len()
    }
}
