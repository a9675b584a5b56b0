//! A single type-erased cache entry.

use std::any::{Any, type_name};
use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::errors::{CacheError, Result};

type Erased = Box<dyn Any + Send + Sync>;

pub(crate) struct Entry {
    value: Erased,
    type_name: &'static str,
    created_at: Instant,
    updated_at: Instant,
    ttl: Duration,
    history: VecDeque<(DateTime<Utc>, Erased)>,
}

impl Entry {
    pub(crate) fn new<T>(value: T, ttl: Duration, now: Instant) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
            created_at: now,
            updated_at: now,
            ttl,
            history: VecDeque::new(),
        }
    }

    /// Fail unless the stored value is a `T`.
    pub(crate) fn check<T: Any>(&self) -> Result<()> {
        if self.value.is::<T>() {
            Ok(())
        } else {
            Err(CacheError::WrongType {
                expected: type_name::<T>(),
                found: self.type_name,
            })
        }
    }

    pub(crate) fn value<T: Any + Clone>(&self) -> Result<T> {
        self.value
            .downcast_ref::<T>()
            .cloned()
            .ok_or(CacheError::WrongType {
                expected: type_name::<T>(),
                found: self.type_name,
            })
    }

    /// Commit a new value. The caller has already type-checked.
    pub(crate) fn write<T>(&mut self, value: T, ttl: Duration, now: Instant, history_limit: usize)
    where
        T: Any + Send + Sync + Clone,
    {
        if history_limit > 0 {
            if self.history.len() >= history_limit {
                let _ = self.history.pop_front();
            }
            self.history.push_back((Utc::now(), Box::new(value.clone())));
        }
        self.value = Box::new(value);
        self.updated_at = now;
        self.ttl = ttl;
    }

    pub(crate) fn history<T: Any + Clone>(&self) -> Result<Vec<(DateTime<Utc>, T)>> {
        self.check::<T>()?;
        Ok(self
            .history
            .iter()
            .filter_map(|(at, v)| v.downcast_ref::<T>().map(|v| (*at, v.clone())))
            .collect())
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.updated_at + self.ttl
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }

    pub(crate) fn info(&self) -> EntryInfo {
        EntryInfo {
            type_name: self.type_name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            ttl: self.ttl,
            expires_at: self.deadline(),
            history_len: self.history.len(),
        }
    }
}

/// Metadata snapshot of one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryInfo {
    /// Name of the stored type.
    pub type_name: &'static str,
    /// When the entry was first created.
    pub created_at: Instant,
    /// When the entry was last written.
    pub updated_at: Instant,
    /// Current time to live, measured from `updated_at`.
    pub ttl: Duration,
    /// `updated_at + ttl`.
    pub expires_at: Instant,
    /// Number of retained history items.
    pub history_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_is_fixed_by_first_value() {
        let e = Entry::new(5_u32, Duration::from_secs(1), Instant::now());
        assert!(e.check::<u32>().is_ok());
        let err = e.check::<String>().unwrap_err();
        assert_eq!(
            err,
            CacheError::WrongType {
                expected: type_name::<String>(),
                found: type_name::<u32>(),
            }
        );
    }

    #[test]
    fn write_updates_value_and_deadline() {
        let start = Instant::now();
        let mut e = Entry::new(1_i64, Duration::from_secs(1), start);
        let later = start + Duration::from_millis(500);
        e.write(2_i64, Duration::from_secs(2), later, 4);
        assert_eq!(e.value::<i64>().unwrap(), 2);
        assert_eq!(e.deadline(), later + Duration::from_secs(2));
        assert_eq!(e.info().created_at, start);
        assert!(!e.is_expired(later + Duration::from_secs(1)));
        assert!(e.is_expired(later + Duration::from_secs(2)));
    }

    #[test]
    fn history_is_bounded() {
        let now = Instant::now();
        let mut e = Entry::new(0_u8, Duration::from_secs(1), now);
        for i in 1..=5_u8 {
            e.write(i, Duration::from_secs(1), now, 3);
        }
        let values: Vec<u8> = e.history::<u8>().unwrap().into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![3, 4, 5]);
    }

    #[test]
    fn history_disabled_with_zero_limit() {
        let now = Instant::now();
        let mut e = Entry::new(0_u8, Duration::from_secs(1), now);
        e.write(1_u8, Duration::from_secs(1), now, 0);
        assert!(e.history::<u8>().unwrap().is_empty());
    }
}
