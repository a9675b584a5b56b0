//! Deadline queue and the shared expiry scheduler.
//!
//! One queue per [`StoreManager`](crate::StoreManager): a `BTreeMap` ordered
//! by deadline plus a reverse index by key, so rescheduling or cancelling an
//! entry is `O(log n)`. A single task sleeps until the earliest deadline,
//! hands due keys back to the manager, and goes back to sleep.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::store::Inner;

/// Composite `(store, key)` identity of an entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EntryKey {
    pub(crate) store: String,
    pub(crate) key: String,
}

impl EntryKey {
    pub(crate) fn new(store: &str, key: &str) -> Self {
        Self {
            store: store.to_owned(),
            key: key.to_owned(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExpiryQueue {
    /// `(deadline, seq)` -> key; `seq` keeps equal deadlines distinct.
    deadlines: BTreeMap<(Instant, u64), EntryKey>,
    by_key: HashMap<EntryKey, (Instant, u64)>,
    seq: u64,
}

impl ExpiryQueue {
    /// Schedule (or move) `key` to `at`. Returns true when `at` became the
    /// earliest deadline, meaning the scheduler must be woken.
    pub(crate) fn schedule(&mut self, key: EntryKey, at: Instant) -> bool {
        self.cancel(&key);
        self.seq = self.seq.wrapping_add(1);
        let slot = (at, self.seq);
        let earliest = self.deadlines.keys().next().is_none_or(|first| slot < *first);
        let _ = self.deadlines.insert(slot, key.clone());
        let _ = self.by_key.insert(key, slot);
        earliest
    }

    pub(crate) fn cancel(&mut self, key: &EntryKey) {
        if let Some(slot) = self.by_key.remove(key) {
            let _ = self.deadlines.remove(&slot);
        }
    }

    /// Remove and return every key whose deadline is at or before `now`.
    pub(crate) fn pop_due(&mut self, now: Instant) -> Vec<EntryKey> {
        let mut due = Vec::new();
        while let Some(entry) = self.deadlines.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let key = entry.remove();
            let _ = self.by_key.remove(&key);
            due.push(key);
        }
        due
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.keys().next().map(|(at, _)| *at)
    }

    pub(crate) fn retain_stores(&mut self, keep: impl Fn(&str) -> bool) {
        self.deadlines.retain(|_, k| keep(&k.store));
        self.by_key.retain(|k, _| keep(&k.store));
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }
}

/// Run the scheduler until the manager is dropped or `cancel` fires.
///
/// Holds only a weak reference between wakeups so an idle scheduler never
/// keeps its manager alive.
pub(crate) async fn run_scheduler(inner: Weak<Inner>, wake: Arc<Notify>, cancel: CancellationToken) {
    debug!("cache expiry scheduler started");
    loop {
        let next = {
            let Some(inner) = inner.upgrade() else { break };
            let due = inner.expiry.lock().pop_due(Instant::now());
            if !due.is_empty() {
                trace!(count = due.len(), "expiry deadlines reached");
            }
            for key in &due {
                inner.expire_if_due(key);
            }
            inner.expiry.lock().next_deadline()
        };

        match next {
            Some(deadline) => {
                tokio::select! {
                    () = tokio::time::sleep_until(deadline) => {}
                    () = wake.notified() => {}
                    () = cancel.cancelled() => break,
                }
            }
            None => {
                tokio::select! {
                    () = wake.notified() => {}
                    () = cancel.cancelled() => break,
                }
            }
        }
    }
    debug!("cache expiry scheduler stopped");
}
