//! Handler id to [`SessionHandler`].

use std::sync::Arc;

use dashmap::DashMap;
use fncmp_core::HandlerId;

use crate::handler::SessionHandler;

/// Registered session handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<HandlerId, Arc<SessionHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry").field("len", &self.handlers.len()).finish()
    }
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its id.
    pub fn register(&self, handler: Arc<SessionHandler>) {
        let _ = self.handlers.insert(handler.id().clone(), handler);
    }

    /// Look up a handler.
    pub fn get(&self, id: &HandlerId) -> Option<Arc<SessionHandler>> {
        self.handlers.get(id).map(|h| Arc::clone(h.value()))
    }

    /// Remove a handler. Safe to call repeatedly.
    pub fn remove(&self, id: &HandlerId) -> Option<Arc<SessionHandler>> {
        self.handlers.remove(id).map(|(_, h)| h)
    }

    /// All handlers.
    pub fn all(&self) -> Vec<Arc<SessionHandler>> {
        self.handlers.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
