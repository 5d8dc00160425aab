//! Process-wide registry of open connections.

use std::sync::Arc;
use std::time::Duration;

use courier_core::ConnectionId;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::connection::ConnectionState;

/// Open connections keyed by id.
///
/// An entry is inserted when a socket opens and removed only after that
/// connection's message tasks have drained.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionState>>,
    count: watch::Sender<usize>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self {
            connections: DashMap::new(),
            count,
        }
    }

    /// Add a connection. Registering the same connection twice counts once.
    pub fn register(&self, connection: Arc<ConnectionState>) {
        let id = connection.id().clone();
        if self.connections.insert(id, connection).is_none() {
            self.count.send_modify(|count| *count += 1);
        }
    }

    /// Forget a connection, returning it if it was registered.
    pub fn remove(&self, id: &ConnectionId) -> Option<Arc<ConnectionState>> {
        let removed = self.connections.remove(id).map(|(_, connection)| connection);
        if removed.is_some() {
            self.count.send_modify(|count| *count = count.saturating_sub(1));
        }
        removed
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Ids of every registered connection.
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| entry.key().clone()).collect()
    }

    /// In-flight messages across every registered connection.
    pub fn active_messages(&self) -> usize {
        self.connections
            .iter()
            .map(|entry| entry.value().active_count())
            .sum()
    }

    /// Ask every registered connection to stop reading.
    pub fn close_all(&self) {
        for entry in &self.connections {
            entry.value().close();
        }
    }

    /// Resolves once no connection is registered.
    pub async fn wait_until_empty(&self) {
        let mut count = self.count.subscribe();
        // The sender lives in `self`, so this only errors if the registry is gone.
        let _ = count.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Block until every registered connection has drained and deregistered.
///
/// Returns `false` if `timeout` elapsed first.
pub async fn wait_for_connections(registry: &ConnectionRegistry, timeout: Option<Duration>) -> bool {
    let pending = registry.len();
    if pending > 0 {
        info!(
            connections = pending,
            active_messages = registry.active_messages(),
            "waiting for connections to drain"
        );
    }

    match timeout {
        Some(timeout) => {
            if tokio::time::timeout(timeout, registry.wait_until_empty()).await.is_ok() {
                true
            } else {
                warn!(
                    remaining = registry.len(),
                    "connections still open after {timeout:?}"
                );
                false
            }
        }
        None => {
            registry.wait_until_empty().await;
            true
        }
    }
}
