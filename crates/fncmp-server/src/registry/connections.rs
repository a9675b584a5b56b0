//! Connection id to live [`Connection`].

use std::sync::Arc;

use dashmap::DashMap;
use fncmp_core::{ConnId, HandlerId};
use tracing::debug;

use crate::transport::connection::Connection;

/// Live connections indexed by id. At most one connection per id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnId, Arc<Connection>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `connection`, replacing and closing any previous one with
    /// the same id. Returns the replaced connection.
    pub fn register(&self, connection: Arc<Connection>) -> Option<Arc<Connection>> {
        let previous = self.connections.insert(connection.id.clone(), connection);
        if let Some(old) = &previous {
            debug!(conn_id = %old.id, "replacing existing connection");
            let _ = old.close();
        }
        previous
    }

    /// Look up a connection.
    pub fn get(&self, id: &ConnId) -> Option<Arc<Connection>> {
        self.connections.get(id).map(|c| Arc::clone(c.value()))
    }

    /// Remove by id. Safe to call repeatedly.
    pub fn remove(&self, id: &ConnId) -> Option<Arc<Connection>> {
        self.connections.remove(id).map(|(_, c)| c)
    }

    /// Remove `connection` only if it is still the registered one for its
    /// id. Returns whether it was removed.
    pub fn remove_exact(&self, connection: &Arc<Connection>) -> bool {
        self.connections
            .remove_if(&connection.id, |_, current| Arc::ptr_eq(current, connection))
            .is_some()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All connection ids.
    pub fn ids(&self) -> Vec<ConnId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// All connections.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Connections served by `handler_id`.
    pub fn for_handler(&self, handler_id: &HandlerId) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .filter(|e| e.value().handler_id() == handler_id)
            .map(|e| Arc::clone(e.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str, handler: &str) -> Arc<Connection> {
        let (conn, _rx) = Connection::channel(ConnId::from(id), HandlerId::from(handler), 4);
        conn
    }

    #[test]
    fn register_and_get() {
        let reg = ConnectionRegistry::new();
        assert!(reg.register(conn("a", "h")).is_none());
        assert!(reg.get(&ConnId::from("a")).is_some());
        assert!(reg.get(&ConnId::from("b")).is_none());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = ConnectionRegistry::new();
        let _ = reg.register(conn("a", "h"));
        assert!(reg.remove(&ConnId::from("a")).is_some());
        assert!(reg.remove(&ConnId::from("a")).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn register_replaces_and_closes_previous() {
        let reg = ConnectionRegistry::new();
        let first = conn("a", "h");
        let second = conn("a", "h");
        let _ = reg.register(Arc::clone(&first));
        let replaced = reg.register(Arc::clone(&second)).unwrap();
        assert!(Arc::ptr_eq(&replaced, &first));
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_exact_ignores_replacement() {
        let reg = ConnectionRegistry::new();
        let first = conn("a", "h");
        let second = conn("a", "h");
        let _ = reg.register(Arc::clone(&first));
        let _ = reg.register(Arc::clone(&second));
        assert!(!reg.remove_exact(&first));
        assert!(reg.get(&ConnId::from("a")).is_some());
        assert!(reg.remove_exact(&second));
        assert!(!reg.remove_exact(&second));
    }

    #[test]
    fn filter_by_handler() {
        let reg = ConnectionRegistry::new();
        let _ = reg.register(conn("a", "h1"));
        let _ = reg.register(conn("b", "h1"));
        let _ = reg.register(conn("c", "h2"));
        let mut ids: Vec<String> = reg
            .for_handler(&HandlerId::from("h1"))
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(reg.ids().len(), 3);
    }

    #[test]
    fn concurrent_register_and_remove() {
        let reg = Arc::new(ConnectionRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let id = format!("c-{t}-{i}");
                        let _ = reg.register(conn(&id, "h"));
                        let _ = reg.get(&ConnId::from(id.as_str()));
                        if i % 2 == 0 {
                            let _ = reg.remove(&ConnId::from(id.as_str()));
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(reg.len(), 8 * 50);
    }
}
