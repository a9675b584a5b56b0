//! Typed handle over one cache entry.

use std::any::Any;
use std::marker::PhantomData;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::entry::EntryInfo;
use crate::errors::Result;
use crate::store::{HookKind, StoreManager};

/// Handle to the entry `key` in namespace `store`, typed as `T`.
///
/// The handle does not hold the value; every call goes to the manager, so
/// clones and handles obtained later all observe the same entry.
pub struct Cache<T> {
    manager: StoreManager,
    store: String,
    key: String,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            store: self.store.clone(),
            key: self.key.clone(),
            _type: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Cache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("store", &self.store)
            .field("key", &self.key)
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T> Cache<T>
where
    T: Any + Send + Sync + Clone,
{
    pub(crate) fn new(manager: StoreManager, store: &str, key: &str) -> Self {
        Self {
            manager,
            store: store.to_owned(),
            key: key.to_owned(),
            _type: PhantomData,
        }
    }

    /// Namespace of the entry.
    pub fn store_key(&self) -> &str {
        &self.store
    }

    /// Key of the entry.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current value.
    pub fn value(&self) -> Result<T> {
        self.manager.get(&self.store, &self.key)
    }

    /// Write with the default TTL.
    pub fn set(&self, value: T) -> Result<()> {
        self.manager.set(&self.store, &self.key, value, None)
    }

    /// Write with an explicit TTL (zero means the default).
    pub fn set_with_ttl(&self, value: T, ttl: Duration) -> Result<()> {
        self.manager.set(&self.store, &self.key, value, Some(ttl))
    }

    /// Read, transform and write back as one step under the namespace lock.
    ///
    /// `f` must not touch the cache.
    pub fn update(&self, f: impl FnOnce(T) -> T) -> Result<T> {
        self.manager.update(&self.store, &self.key, f)
    }

    /// Remove the entry and its hooks.
    pub fn delete(&self) -> bool {
        self.manager.delete(&self.store, &self.key)
    }

    /// Metadata snapshot.
    pub fn info(&self) -> Result<EntryInfo> {
        self.manager.entry_info(&self.store, &self.key)
    }

    /// When the entry was created.
    pub fn created_at(&self) -> Result<Instant> {
        self.info().map(|i| i.created_at)
    }

    /// When the entry was last written.
    pub fn updated_at(&self) -> Result<Instant> {
        self.info().map(|i| i.updated_at)
    }

    /// Current TTL.
    pub fn ttl(&self) -> Result<Duration> {
        self.info().map(|i| i.ttl)
    }

    /// When the entry will expire unless written again.
    pub fn expires_at(&self) -> Result<Instant> {
        self.info().map(|i| i.expires_at)
    }

    /// Past values, oldest first.
    pub fn history(&self) -> Result<Vec<(DateTime<Utc>, T)>> {
        self.manager.history(&self.store, &self.key)
    }

    /// Run `hook` after every write to this entry.
    pub fn on_change(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.manager.on(HookKind::Change, &self.store, &self.key, hook);
    }

    /// Run `hook` when this entry expires.
    pub fn on_timeout(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.manager.on(HookKind::Timeout, &self.store, &self.key, hook);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use assert_matches::assert_matches;
    use fncmp_core::Session;
    use fncmp_settings::CacheSettings;

    use super::*;
    use crate::errors::CacheError;

    fn manager() -> StoreManager {
        StoreManager::new(CacheSettings::default())
    }

    #[tokio::test]
    async fn handles_share_one_entry() {
        let m = manager();
        let session = Session::new("conn-1");
        let a = m.use_cache::<u32>(&session, "count").unwrap();
        let b = m.use_cache::<u32>(&session, "count").unwrap();
        a.set(7).unwrap();
        assert_eq!(b.value().unwrap(), 7);
        assert_eq!(a.store_key(), "conn-1");
        assert_eq!(a.key(), "count");
    }

    #[tokio::test]
    async fn update_applies_function() {
        let m = manager();
        let c = m.use_cache::<u32>(&Session::new("conn-1"), "count").unwrap();
        assert_eq!(c.update(|n| n + 1).unwrap(), 1);
        assert_eq!(c.update(|n| n * 10).unwrap(), 10);
        assert_eq!(c.value().unwrap(), 10);
    }

    #[tokio::test]
    async fn metadata_tracks_writes() {
        let m = manager();
        let c = m.use_cache::<String>(&Session::new("conn-1"), "name").unwrap();
        let created = c.created_at().unwrap();
        c.set_with_ttl("x".into(), Duration::from_secs(30)).unwrap();
        assert_eq!(c.created_at().unwrap(), created);
        assert!(c.updated_at().unwrap() >= created);
        assert_eq!(c.ttl().unwrap(), Duration::from_secs(30));
        assert_eq!(c.expires_at().unwrap(), c.updated_at().unwrap() + Duration::from_secs(30));
    }

    #[tokio::test]
    async fn delete_makes_value_not_found() {
        let m = manager();
        let c = m.use_cache::<u8>(&Session::new("conn-1"), "k").unwrap();
        assert!(c.delete());
        assert_matches!(c.value(), Err(CacheError::NotFound { .. }));
        assert!(!c.delete());
    }

    #[tokio::test(start_paused = true)]
    async fn handle_timeout_hook() {
        let m = manager();
        let c = m.use_cache::<u8>(&Session::new("conn-1"), "k").unwrap();
        let fired = Arc::new(AtomicBool::new(false));
        let f = Arc::clone(&fired);
        c.on_timeout(move || f.store(true, Ordering::SeqCst));
        c.set_with_ttl(1, Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(c.value().is_err());
    }

    #[tokio::test]
    async fn history_through_handle() {
        let m = manager();
        let c = m.use_cache::<i8>(&Session::new("conn-1"), "h").unwrap();
        c.set(1).unwrap();
        c.set(-1).unwrap();
        let values: Vec<i8> = c.history().unwrap().into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![1, -1]);
    }
}
