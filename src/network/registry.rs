//! Connection Registry
//!
//! Live set of connections, keyed by id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::connection::{Connection, ConnectionId, ConnectionState};

/// Thread-safe collection of live connections
///
/// Inserts come from the accept path, removals from the liveness monitor,
/// read failures and explicit stop. Iteration always goes through
/// [`snapshot`](Self::snapshot) so a scan never holds the lock while it
/// talks to sockets.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns false if the id is already present or
    /// the connection has started closing.
    pub fn insert(&self, connection: Arc<Connection>) -> bool {
        if !matches!(
            connection.state(),
            ConnectionState::Pending | ConnectionState::Active
        ) {
            return false;
        }

        let mut connections = self.connections.write();
        if connections.contains_key(&connection.id()) {
            return false;
        }
        connections.insert(connection.id(), connection);
        true
    }

    /// Remove a connection by id
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.write().remove(&id)
    }

    /// Look up a connection by id
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.read().get(&id).cloned()
    }

    /// Point-in-time copy of every registered connection
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Drop every entry, returning what was registered
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.connections.write().drain().map(|(_, c)| c).collect()
    }
}
