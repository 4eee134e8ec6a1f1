//! # Connection Registry
//!
//! Push connections keyed by an opaque client id. This is the one structure
//! shared between concurrent operations, so it sits on a concurrent map and
//! needs no outer lock.
//!
//! A failed send drops that connection; the broadcast continues with the
//! remaining ones.

use crate::directives::{self, Directive};
use crate::DmxError;
use dashmap::DashMap;

/// One push connection.
pub trait Connection: Send + Sync {
    fn send(&self, message: &str) -> Result<(), DmxError>;
}

#[derive(Debug)]
pub struct ConnectionRegistry<C> {
    connections: DashMap<String, C>,
}

impl<C: Connection> ConnectionRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection, replacing any previous one of the same client.
    pub fn register(&self, client_id: impl Into<String>, connection: C) {
        let client_id = client_id.into();
        tracing::debug!(%client_id, "connection registered");
        self.connections.insert(client_id, connection);
    }

    pub fn unregister(&self, client_id: &str) -> Option<C> {
        let removed = self.connections.remove(client_id).map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!(%client_id, "connection unregistered");
        }
        removed
    }

    /// Unregister `client_id` only if its current connection satisfies
    /// `is_mine`. A connection that replaced it under the same id stays.
    pub fn unregister_if(&self, client_id: &str, is_mine: impl FnOnce(&C) -> bool) -> Option<C> {
        let removed = self
            .connections
            .remove_if(client_id, |_, connection| is_mine(connection))
            .map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!(%client_id, "connection unregistered");
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.connections.contains_key(client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Send to every connection. Returns the number of successful sends.
    pub fn broadcast(&self, message: &str) -> usize {
        self.broadcast_filtered(message, None)
    }

    /// Send to every connection but the originating client's.
    pub fn broadcast_except(&self, message: &str, origin: &str) -> usize {
        self.broadcast_filtered(message, Some(origin))
    }

    /// Send a directive batch to every connection. An empty batch sends nothing.
    pub fn broadcast_directives(&self, batch: &[Directive]) -> Result<usize, DmxError> {
        if batch.is_empty() {
            return Ok(0);
        }
        Ok(self.broadcast(&directives::to_json(batch)?))
    }

    fn broadcast_filtered(&self, message: &str, skip: Option<&str>) -> usize {
        let mut delivered = 0usize;
        let mut failed = Vec::new();
        for entry in self.connections.iter() {
            if skip == Some(entry.key().as_str()) {
                continue;
            }
            match entry.value().send(message) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(e) => {
                    tracing::warn!(client_id = %entry.key(), error = %e, "send failed, dropping connection");
                    failed.push(entry.key().clone());
                }
            }
        }
        for client_id in failed {
            self.connections.remove(&client_id);
        }
        delivered
    }
}

impl<C: Connection + Clone> ConnectionRegistry<C> {
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<C> {
        self.connections.get(client_id).map(|c| c.value().clone())
    }
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
