//! Listener id to registered callback.

use std::collections::HashMap;
use std::sync::Arc;

use fncmp_core::{ComponentId, ConnId, EventListener, ListenerId};
use metrics::gauge;
use parking_lot::Mutex;
use tracing::debug;

use crate::callback::Callback;
use crate::metrics::LISTENERS_REGISTERED;

/// A listener bound to its component and callback.
pub struct RegisteredListener {
    /// Wire descriptor sent to the client.
    pub listener: EventListener,
    /// Component whose markup carries the listener.
    pub target: ComponentId,
    /// Connection allowed to trigger it; `None` means any connection.
    pub scope: Option<ConnId>,
    /// Callback to run when it fires.
    pub callback: Arc<dyn Callback>,
}

impl std::fmt::Debug for RegisteredListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredListener")
            .field("listener", &self.listener)
            .field("target", &self.target)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl RegisteredListener {
    /// Listener id.
    pub fn id(&self) -> &ListenerId {
        &self.listener.id
    }

    /// Whether `conn_id` may trigger this listener.
    pub fn accepts(&self, conn_id: &ConnId) -> bool {
        self.scope.as_ref().is_none_or(|scope| scope == conn_id)
    }
}

/// All registered listeners behind a single lock.
///
/// Ids are generated before insertion, so `add` never conflicts.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: Mutex<HashMap<ListenerId, Arc<RegisteredListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener under its own id.
    pub fn add(&self, listener: RegisteredListener) -> ListenerId {
        let id = listener.id().clone();
        let previous = self.listeners.lock().insert(id.clone(), Arc::new(listener));
        if previous.is_none() {
            gauge!(LISTENERS_REGISTERED).increment(1.0);
        }
        id
    }

    /// Remove a listener.
    pub fn remove(&self, id: &ListenerId) -> Option<Arc<RegisteredListener>> {
        let removed = self.listeners.lock().remove(id);
        if removed.is_some() {
            gauge!(LISTENERS_REGISTERED).decrement(1.0);
        }
        removed
    }

    /// Look up a listener regardless of scope.
    pub fn get(&self, id: &ListenerId) -> Option<Arc<RegisteredListener>> {
        self.listeners.lock().get(id).cloned()
    }

    /// Look up a listener that `conn_id` is allowed to trigger.
    ///
    /// A listener scoped to another connection is reported as missing.
    pub fn get_scoped(&self, id: &ListenerId, conn_id: &ConnId) -> Option<Arc<RegisteredListener>> {
        self.get(id).filter(|l| l.accepts(conn_id))
    }

    /// Snapshot of every listener.
    pub fn all(&self) -> Vec<Arc<RegisteredListener>> {
        self.listeners.lock().values().cloned().collect()
    }

    /// Remove every listener scoped to `conn_id`. Returns how many went.
    #[allow(clippy::cast_precision_loss)]
    pub fn remove_by_connection(&self, conn_id: &ConnId) -> usize {
        let removed = {
            let mut listeners = self.listeners.lock();
            let before = listeners.len();
            listeners.retain(|_, l| l.scope.as_ref() != Some(conn_id));
            before - listeners.len()
        };
        if removed > 0 {
            gauge!(LISTENERS_REGISTERED).decrement(removed as f64);
            debug!(conn_id = %conn_id, removed, "purged connection listeners");
        }
        removed
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use fncmp_core::EventKind;

    use super::*;
    use crate::callback::{CallbackResult, Context};
    use crate::component::FnComponent;

    async fn noop(_ctx: Context) -> CallbackResult {
        Ok(FnComponent::none())
    }

    fn listener(scope: Option<&str>) -> RegisteredListener {
        RegisteredListener {
            listener: EventListener::new(EventKind::Click),
            target: ComponentId::from("btn1"),
            scope: scope.map(ConnId::from),
            callback: Arc::new(noop),
        }
    }

    #[test]
    fn add_get_remove() {
        let reg = ListenerRegistry::new();
        let id = reg.add(listener(None));
        let found = reg.get(&id).unwrap();
        assert_eq!(found.target.as_str(), "btn1");
        assert_eq!(found.listener.on, EventKind::Click);
        assert!(reg.remove(&id).is_some());
        assert!(reg.remove(&id).is_none());
        assert!(reg.get(&id).is_none());
    }

    #[test]
    fn scoped_lookup_rejects_other_connections() {
        let reg = ListenerRegistry::new();
        let id = reg.add(listener(Some("conn-1")));
        assert!(reg.get_scoped(&id, &ConnId::from("conn-1")).is_some());
        assert!(reg.get_scoped(&id, &ConnId::from("conn-2")).is_none());

        let open = reg.add(listener(None));
        assert!(reg.get_scoped(&open, &ConnId::from("anyone")).is_some());
    }

    #[test]
    fn remove_by_connection_keeps_others() {
        let reg = ListenerRegistry::new();
        let _ = reg.add(listener(Some("conn-1")));
        let _ = reg.add(listener(Some("conn-1")));
        let keep = reg.add(listener(Some("conn-2")));
        let unscoped = reg.add(listener(None));

        assert_eq!(reg.remove_by_connection(&ConnId::from("conn-1")), 2);
        assert_eq!(reg.remove_by_connection(&ConnId::from("conn-1")), 0);
        assert_eq!(reg.len(), 2);
        assert!(reg.get(&keep).is_some());
        assert!(reg.get(&unscoped).is_some());
        assert_eq!(reg.all().len(), 2);
    }

    #[test]
    fn concurrent_add_and_get() {
        let reg = Arc::new(ListenerRegistry::new());
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let id = reg.add(listener(Some("conn-1")));
                        assert!(reg.get(&id).is_some());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(reg.len(), 1000);
        assert_eq!(reg.remove_by_connection(&ConnId::from("conn-1")), 1000);
        assert!(reg.is_empty());
    }
}
