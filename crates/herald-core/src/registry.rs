//! Connection registry.
//!
//! Owns the live [`Connection`] of every subscribed channel. Connections
//! never leave the registry; callers address them by channel.

use crate::connection::{Connection, ConnectionContext, Phase};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use herald_protocol::ChannelId;
use tracing::debug;

pub(crate) struct ConnectionRegistry {
    connections: DashMap<ChannelId, Connection>,
    ctx: ConnectionContext,
}

impl ConnectionRegistry {
    pub fn new(ctx: ConnectionContext) -> Self {
        Self {
            connections: DashMap::new(),
            ctx,
        }
    }

    /// Make sure `channel` has a connection, creating and opening one if
    /// needed. An existing connection is left as it is.
    ///
    /// Returns `true` if a connection was created.
    pub fn ensure(&self, channel: ChannelId) -> bool {
        match self.connections.entry(channel) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                let connection = Connection::new(channel, self.ctx.clone());
                debug!(channel = %channel, url = %connection.url(), "Creating connection");
                // Opened while the entry is held so a concurrent remove
                // cannot observe a connection that has not started yet.
                connection.open();
                vacant.insert(connection);
                true
            }
        }
    }

    /// Close and discard the connection for `channel`, if any.
    pub fn remove(&self, channel: ChannelId) -> bool {
        match self.connections.remove(&channel) {
            Some((_, connection)) => {
                connection.close();
                debug!(channel = %connection.channel(), "Connection removed");
                true
            }
            None => false,
        }
    }

    /// Close and discard every connection.
    pub fn remove_all(&self) -> usize {
        let mut removed = 0;
        self.connections.retain(|_, connection| {
            connection.close();
            removed += 1;
            false
        });
        if removed > 0 {
            debug!(connections = removed, "All connections removed");
        }
        removed
    }

    /// Whether `channel` has a connection with an open session.
    #[must_use]
    pub fn status_of(&self, channel: ChannelId) -> bool {
        self.connections
            .get(&channel)
            .map(|c| c.is_open())
            .unwrap_or(false)
    }

    /// Lifecycle phase of `channel`'s connection.
    #[must_use]
    pub fn phase_of(&self, channel: ChannelId) -> Option<Phase> {
        self.connections.get(&channel).map(|c| c.phase())
    }

    /// Channels that currently have a connection.
    #[must_use]
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut channels: Vec<_> = self.connections.iter().map(|e| *e.key()).collect();
        channels.sort();
        channels
    }
}
