//! Connection registry: live subscribers and their channel interest.
//!
//! A single `RwLock<HashMap>` guards the table. Every method takes the lock
//! for the duration of one call only; it is never held across `.await` or
//! socket I/O, so fan-out never serializes unrelated subscribers.
//!
//! Each entry's channel set lives behind an `Arc` and is swapped as a whole
//! on update, so a reader sees either the old set or the new one.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::channels::ChannelSet;
use crate::errors::RegistryError;
use crate::ids::ConnectionId;
use crate::websocket::connection::ClientConnection;

struct Entry {
    connection: Arc<ClientConnection>,
    channels: Arc<ChannelSet>,
}

/// Process-wide table of subscribed connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection with its first, non-empty channel set.
    pub fn register(
        &self,
        connection: Arc<ClientConnection>,
        channels: ChannelSet,
    ) -> Result<(), RegistryError> {
        if channels.is_empty() {
            return Err(RegistryError::InvalidInterest);
        }
        let mut entries = self.entries.write();
        if entries.contains_key(&connection.id) {
            return Err(RegistryError::AlreadyRegistered(connection.id.clone()));
        }
        debug!(conn_id = %connection.id, channels = channels.len(), "connection registered");
        let _ = entries.insert(
            connection.id.clone(),
            Entry {
                connection,
                channels: Arc::new(channels),
            },
        );
        Ok(())
    }

    /// Replace a registered connection's channel set.
    ///
    /// The old set is discarded, not merged. On error the entry is untouched.
    pub fn update_interest(
        &self,
        id: &ConnectionId,
        channels: ChannelSet,
    ) -> Result<(), RegistryError> {
        if channels.is_empty() {
            return Err(RegistryError::InvalidInterest);
        }
        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::UnknownConnection(id.clone()))?;
        debug!(conn_id = %id, channels = channels.len(), "interest updated");
        entry.channels = Arc::new(channels);
        Ok(())
    }

    /// Remove a connection. Returns `false` if it was already gone.
    pub fn remove(&self, id: &ConnectionId) -> bool {
        let removed = self.entries.write().remove(id).is_some();
        if removed {
            debug!(conn_id = %id, "connection removed");
        }
        removed
    }

    /// Every registered connection whose interest intersects `channels`.
    ///
    /// Taken under one read lock: the result is a snapshot with no duplicates
    /// and nothing that was removed before the call began.
    pub fn matching(&self, channels: &ChannelSet) -> Vec<Arc<ClientConnection>> {
        if channels.is_empty() {
            return Vec::new();
        }
        self.entries
            .read()
            .values()
            .filter(|e| e.channels.intersects(channels))
            .map(|e| Arc::clone(&e.connection))
            .collect()
    }

    /// Current channel set of a connection.
    pub fn channels_of(&self, id: &ConnectionId) -> Option<Arc<ChannelSet>> {
        self.entries.read().get(id).map(|e| Arc::clone(&e.channels))
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.entries.read().contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
