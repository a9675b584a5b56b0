//! `StoreManager`: the cache service.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fncmp_core::Session;
use fncmp_settings::CacheSettings;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::entry::{Entry, EntryInfo};
use crate::errors::{CacheError, Result};
use crate::expiry::{EntryKey, ExpiryQueue, run_scheduler};
use crate::handle::Cache;

/// Which hook to register or trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs after every successful write.
    Change,
    /// Runs when an entry expires, before it is removed.
    Timeout,
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Store {
    entries: Mutex<HashMap<String, Entry>>,
    /// Set under the entries lock once the store left `stores`; writers
    /// holding a stale slot must look it up again.
    retired: AtomicBool,
}

impl Store {
    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

pub(crate) struct Inner {
    stores: DashMap<String, Arc<Store>>,
    hooks: Mutex<HashMap<(HookKind, EntryKey), Hook>>,
    pub(crate) expiry: Mutex<ExpiryQueue>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
    settings: CacheSettings,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Namespaced typed cache with TTL expiry and hooks.
///
/// Cheap to clone; clones share the same stores and scheduler.
#[derive(Clone)]
pub struct StoreManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager").finish_non_exhaustive()
    }
}

impl StoreManager {
    /// Create a manager and start its expiry scheduler.
    ///
    /// Outside a Tokio runtime no scheduler is started and expired entries
    /// are only reaped when next accessed.
    pub fn new(settings: CacheSettings) -> Self {
        let inner = Arc::new(Inner {
            stores: DashMap::new(),
            hooks: Mutex::new(HashMap::new()),
            expiry: Mutex::new(ExpiryQueue::default()),
            wake: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
            settings,
        });

        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                let _ = rt.spawn(run_scheduler(
                    Arc::downgrade(&inner),
                    Arc::clone(&inner.wake),
                    inner.shutdown.clone(),
                ));
            }
            Err(_) => warn!("no tokio runtime; cache entries expire lazily on access"),
        }

        Self { inner }
    }

    /// The settings this manager was built with.
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// TTL actually applied for a requested one.
    ///
    /// `None` and zero mean the configured default; anything else is capped
    /// at the configured maximum.
    pub fn effective_ttl(&self, requested: Option<Duration>) -> Duration {
        match requested {
            None => self.inner.settings.default_ttl(),
            Some(ttl) if ttl.is_zero() => self.inner.settings.default_ttl(),
            Some(ttl) => ttl.min(self.inner.settings.max_ttl()),
        }
    }

    /// Read the value under `store`/`key`.
    pub fn get<T>(&self, store: &str, key: &str) -> Result<T>
    where
        T: Any + Clone,
    {
        let slot = self.inner.store(store).ok_or_else(|| CacheError::not_found(store, key))?;
        {
            let entries = slot.entries.lock();
            let entry = entries.get(key).ok_or_else(|| CacheError::not_found(store, key))?;
            if !entry.is_expired(Instant::now()) {
                return entry.value::<T>();
            }
        }
        // Past its deadline but not yet reaped by the scheduler.
        self.inner.expire_if_due(&EntryKey::new(store, key));
        Err(CacheError::not_found(store, key))
    }

    /// Write `value` under `store`/`key`, creating the entry if needed.
    ///
    /// Create, type check and commit happen under the namespace lock; the
    /// change hook runs after the lock is released and before returning.
    pub fn set<T>(&self, store: &str, key: &str, value: T, ttl: Option<Duration>) -> Result<()>
    where
        T: Any + Send + Sync + Clone,
    {
        let ttl = self.effective_ttl(ttl);
        let limit = self.inner.settings.history_limit;
        let deadline = self.inner.with_entries(store, |entries| {
            let now = Instant::now();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.check::<T>()?;
                    entry.write(value, ttl, now, limit);
                }
                None => {
                    let mut entry = Entry::new(value.clone(), ttl, now);
                    entry.write(value, ttl, now, limit);
                    let _ = entries.insert(key.to_owned(), entry);
                }
            }
            Ok(now + ttl)
        })?;

        let ek = EntryKey::new(store, key);
        self.inner.schedule(ek.clone(), deadline);
        counter!("cache_writes_total").increment(1);
        debug!(store, key, ttl_ms = ttl.as_millis() as u64, "cache entry written");
        let _ = self.inner.run_hook(HookKind::Change, &ek);
        Ok(())
    }

    /// Remove an entry and its hooks. Returns whether an entry existed.
    ///
    /// No hook runs on explicit deletion.
    pub fn delete(&self, store: &str, key: &str) -> bool {
        let ek = EntryKey::new(store, key);
        let Some(slot) = self.inner.store(store) else {
            self.inner.purge_hooks(&ek);
            return false;
        };
        let removed = {
            let mut entries = slot.entries.lock();
            let removed = entries.remove(key).is_some();
            self.inner.expiry.lock().cancel(&ek);
            self.inner.purge_hooks(&ek);
            removed
        };
        if removed {
            self.inner.reclaim(store);
        }
        removed
    }

    /// Apply `f` to the current value and write the result back, all under
    /// the namespace lock. The entry gets the default TTL, as with
    /// [`set`](Self::set) without one.
    ///
    /// `f` must not call back into this manager.
    pub fn update<T>(&self, store: &str, key: &str, f: impl FnOnce(T) -> T) -> Result<T>
    where
        T: Any + Send + Sync + Clone,
    {
        let ttl = self.effective_ttl(None);
        let limit = self.inner.settings.history_limit;
        let slot = self.inner.store(store).ok_or_else(|| CacheError::not_found(store, key))?;
        let (next, deadline) = {
            let mut entries = slot.entries.lock();
            let now = Instant::now();
            let entry = entries
                .get_mut(key)
                .filter(|e| !slot.is_retired() && !e.is_expired(now))
                .ok_or_else(|| CacheError::not_found(store, key))?;
            let next = f(entry.value::<T>()?);
            entry.write(next.clone(), ttl, now, limit);
            (next, now + ttl)
        };

        let ek = EntryKey::new(store, key);
        self.inner.schedule(ek.clone(), deadline);
        counter!("cache_writes_total").increment(1);
        let _ = self.inner.run_hook(HookKind::Change, &ek);
        Ok(next)
    }

    /// Register `hook` for `store`/`key`, replacing any previous one.
    pub fn on(&self, kind: HookKind, store: &str, key: &str, hook: impl Fn() + Send + Sync + 'static) {
        let _ = self
            .inner
            .hooks
            .lock()
            .insert((kind, EntryKey::new(store, key)), Arc::new(hook));
    }

    /// Shorthand for [`on`](Self::on) with [`HookKind::Change`].
    pub fn on_change(&self, store: &str, key: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.on(HookKind::Change, store, key, hook);
    }

    /// Shorthand for [`on`](Self::on) with [`HookKind::Timeout`].
    pub fn on_timeout(&self, store: &str, key: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.on(HookKind::Timeout, store, key, hook);
    }

    /// Invoke the registered hook directly. Returns whether one ran.
    pub fn trigger(&self, kind: HookKind, store: &str, key: &str) -> bool {
        self.inner.run_hook(kind, &EntryKey::new(store, key))
    }

    /// Typed handle to `key` in the session's namespace.
    ///
    /// Creates the entry with `T::default()` and the default TTL if absent.
    pub fn use_cache<T>(&self, session: &Session, key: &str) -> Result<Cache<T>>
    where
        T: Any + Send + Sync + Clone + Default,
    {
        self.use_store_cache(session.store_key(), key)
    }

    /// Typed handle to `key` in an explicit namespace.
    pub fn use_store_cache<T>(&self, store: &str, key: &str) -> Result<Cache<T>>
    where
        T: Any + Send + Sync + Clone + Default,
    {
        if store.is_empty() {
            return Err(CacheError::MissingSessionContext);
        }
        let created = self.inner.with_entries(store, |entries| match entries.get(key) {
            Some(entry) => {
                entry.check::<T>()?;
                Ok(None)
            }
            None => {
                let now = Instant::now();
                let ttl = self.inner.settings.default_ttl();
                let _ = entries.insert(key.to_owned(), Entry::new(T::default(), ttl, now));
                Ok(Some(now + ttl))
            }
        })?;
        if let Some(deadline) = created {
            self.inner.schedule(EntryKey::new(store, key), deadline);
            debug!(store, key, "cache entry created");
        }
        Ok(Cache::new(self.clone(), store, key))
    }

    /// Metadata for `store`/`key`.
    pub fn entry_info(&self, store: &str, key: &str) -> Result<EntryInfo> {
        let slot = self.inner.store(store).ok_or_else(|| CacheError::not_found(store, key))?;
        let entries = slot.entries.lock();
        entries
            .get(key)
            .map(Entry::info)
            .ok_or_else(|| CacheError::not_found(store, key))
    }

    /// Past values of `store`/`key`, oldest first.
    pub fn history<T>(&self, store: &str, key: &str) -> Result<Vec<(DateTime<Utc>, T)>>
    where
        T: Any + Clone,
    {
        let slot = self.inner.store(store).ok_or_else(|| CacheError::not_found(store, key))?;
        let entries = slot.entries.lock();
        entries
            .get(key)
            .ok_or_else(|| CacheError::not_found(store, key))?
            .history()
    }

    /// Remove a whole namespace with its expiries and hooks.
    ///
    /// Returns the number of entries dropped. No hooks run.
    pub fn drop_store(&self, store: &str) -> usize {
        let dropped = self.inner.stores.remove(store).map_or(0, |(_, slot)| {
            let entries = slot.entries.lock();
            slot.retired.store(true, Ordering::Release);
            entries.len()
        });
        self.inner.expiry.lock().retain_stores(|s| s != store);
        self.inner.hooks.lock().retain(|(_, k), _| k.store != store);
        if dropped > 0 {
            debug!(store, entries = dropped, "cache store dropped");
        }
        dropped
    }

    /// Number of namespaces.
    pub fn store_count(&self) -> usize {
        self.inner.stores.len()
    }

    /// Number of entries in `store`.
    pub fn len(&self, store: &str) -> usize {
        self.inner.store(store).map_or(0, |slot| slot.entries.lock().len())
    }

    /// Whether `store` has no entries.
    pub fn is_empty(&self, store: &str) -> bool {
        self.len(store) == 0
    }

    /// Number of entries with a pending expiry.
    pub fn scheduled(&self) -> usize {
        self.inner.expiry.lock().len()
    }
}

impl Inner {
    fn store(&self, name: &str) -> Option<Arc<Store>> {
        self.stores.get(name).map(|s| Arc::clone(&s))
    }

    fn store_or_create(&self, name: &str) -> Arc<Store> {
        if let Some(slot) = self.store(name) {
            return slot;
        }
        Arc::clone(&self.stores.entry(name.to_owned()).or_default())
    }

    /// Run `f` on the live entries of `name`, creating the namespace if
    /// needed. Retries when the slot was reclaimed before the lock was taken.
    fn with_entries<R>(&self, name: &str, f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<R>) -> Result<R> {
        loop {
            let slot = self.store_or_create(name);
            let mut entries = slot.entries.lock();
            if !slot.is_retired() {
                return f(&mut entries);
            }
        }
    }

    /// Remove `name` from `stores` if it has no entries left, together with
    /// the hooks registered under it.
    fn reclaim(&self, name: &str) {
        let removed = self.stores.remove_if(name, |_, slot| {
            let entries = slot.entries.lock();
            if entries.is_empty() {
                slot.retired.store(true, Ordering::Release);
                true
            } else {
                false
            }
        });
        if removed.is_some() {
            self.hooks.lock().retain(|(_, k), _| k.store != name);
            trace!(store = name, "empty cache store reclaimed");
        }
    }

    fn schedule(&self, key: EntryKey, at: Instant) {
        if self.expiry.lock().schedule(key, at) {
            self.wake.notify_one();
        }
    }

    fn purge_hooks(&self, key: &EntryKey) {
        let mut hooks = self.hooks.lock();
        let _ = hooks.remove(&(HookKind::Change, key.clone()));
        let _ = hooks.remove(&(HookKind::Timeout, key.clone()));
    }

    /// Run a hook outside the hook lock. Panics are caught and logged.
    fn run_hook(&self, kind: HookKind, key: &EntryKey) -> bool {
        let hook = self.hooks.lock().get(&(kind, key.clone())).cloned();
        let Some(hook) = hook else { return false };
        if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
            error!(store = %key.store, key = %key.key, ?kind, "cache hook panicked");
        }
        true
    }

    /// Expire `key` if its deadline has passed; otherwise reschedule it for
    /// the remaining time.
    pub(crate) fn expire_if_due(&self, key: &EntryKey) {
        let Some(slot) = self.store(&key.store) else { return };

        let deadline = slot.entries.lock().get(&key.key).map(Entry::deadline);
        match deadline {
            None => return,
            Some(at) if at > Instant::now() => {
                self.schedule(key.clone(), at);
                return;
            }
            Some(_) => {}
        }

        let _ = self.run_hook(HookKind::Timeout, key);

        // The hook may have refreshed the entry. Removal, its deadline and
        // its hooks go together under the namespace lock so a concurrent
        // write cannot recreate the entry in between.
        let mut refreshed = None;
        let removed = {
            let mut entries = slot.entries.lock();
            let state = entries
                .get(&key.key)
                .map(|e| (e.is_expired(Instant::now()), e.deadline()));
            match state {
                Some((true, _)) => {
                    let _ = entries.remove(&key.key);
                    self.expiry.lock().cancel(key);
                    self.purge_hooks(key);
                    true
                }
                Some((false, at)) => {
                    refreshed = Some(at);
                    false
                }
                None => false,
            }
        };
        if let Some(at) = refreshed {
            self.schedule(key.clone(), at);
        }

        if removed {
            counter!("cache_expirations_total").increment(1);
            debug!(store = %key.store, key = %key.key, "cache entry expired");
            self.reclaim(&key.store);
        }
    }
}
