//! Ledger
//!
//! A bounded, TTL-aware key/value store that records the jobs this
//! controller currently believes are reserved. The ledger is advisory:
//! the upstream queue's reservation result is the only source of truth for
//! whether a job is taken, and nothing here gates a reservation.

pub mod job;

pub use job::JobLedger;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors returned by ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger already holds the maximum number of distinct keys
    #[error("ledger is full ({max_entries} entries)")]
    Full { max_entries: usize },

    /// A stored value could not be deserialized
    #[error("corrupt ledger entry '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A value could not be serialized for storage
    #[error("failed to serialize ledger entry '{key}': {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Bounded string store guarded by a single read/write lock
///
/// The lock is held only for the map access itself.
pub struct Ledger {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
}

impl Ledger {
    /// Creates a ledger holding at most `max_entries` distinct keys
    ///
    /// A limit of zero means unbounded.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Stores `value` under `key`
    ///
    /// A zero `ttl` stores the entry without expiry. Writing a new key fails
    /// with [`LedgerError::Full`] once the limit is reached (after expired
    /// entries have been reclaimed); overwriting an existing key always succeeds.
    pub fn set(&self, key: &str, value: impl Into<String>, ttl: Duration) -> Result<(), LedgerError> {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if self.max_entries > 0 && entries.len() >= self.max_entries && !entries.contains_key(key)
        {
            entries.retain(|_, entry| !entry.is_expired(now));
            if entries.len() >= self.max_entries {
                return Err(LedgerError::Full {
                    max_entries: self.max_entries,
                });
            }
        }

        let expires_at = if ttl.is_zero() { None } else { Some(now + ttl) };
        entries.insert(
            key.to_string(),
            Entry {
                value: value.into(),
                expires_at,
            },
        );

        Ok(())
    }

    /// Returns the value stored under `key`
    ///
    /// An expired entry reads as a miss.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);

        entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.value.clone())
    }

    /// Removes `key`, returning whether an entry was present
    pub fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_get_delete() {
        let ledger = Ledger::new(10);

        ledger.set("a", "one", Duration::ZERO).unwrap();
        assert_eq!(ledger.get("a"), Some("one".to_string()));

        assert!(ledger.delete("a"));
        assert_eq!(ledger.get("a"), None);
        assert!(!ledger.delete("a"));
    }

    #[test]
    fn test_overwrite_replaces_value() {
        let ledger = Ledger::new(10);

        ledger.set("a", "one", Duration::ZERO).unwrap();
        ledger.set("a", "two", Duration::ZERO).unwrap();

        assert_eq!(ledger.get("a"), Some("two".to_string()));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_ttl_expiry_reads_as_miss() {
        let ledger = Ledger::new(10);

        ledger.set("a", "one", Duration::from_millis(50)).unwrap();
        assert_eq!(ledger.get("a"), Some("one".to_string()));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(ledger.get("a"), None);
    }

    #[test]
    fn test_capacity_rejects_new_keys_only() {
        let ledger = Ledger::new(3);

        for key in ["a", "b", "c"] {
            ledger.set(key, "v", Duration::ZERO).unwrap();
        }

        let err = ledger.set("d", "v", Duration::ZERO).unwrap_err();
        assert!(matches!(err, LedgerError::Full { max_entries: 3 }));

        ledger.set("b", "updated", Duration::ZERO).unwrap();
        assert_eq!(ledger.get("b"), Some("updated".to_string()));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_capacity_reclaims_expired_entries() {
        let ledger = Ledger::new(2);

        ledger.set("a", "v", Duration::from_millis(20)).unwrap();
        ledger.set("b", "v", Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(40));

        ledger.set("c", "v", Duration::ZERO).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get("a"), None);
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let ledger = Ledger::new(0);

        for i in 0..500 {
            ledger.set(&format!("key-{}", i), "v", Duration::ZERO).unwrap();
        }
        assert_eq!(ledger.len(), 500);
    }

    #[test]
    fn test_purge_expired() {
        let ledger = Ledger::new(10);

        ledger.set("short", "v", Duration::from_millis(20)).unwrap();
        ledger.set("forever", "v", Duration::ZERO).unwrap();
        thread::sleep(Duration::from_millis(40));

        assert_eq!(ledger.purge_expired(), 1);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("forever"), Some("v".to_string()));
    }

    #[test]
    fn test_concurrent_access() {
        let ledger = Arc::new(Ledger::new(0));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("{}-{}", t, i);
                        ledger.set(&key, key.clone(), Duration::ZERO).unwrap();
                        assert_eq!(ledger.get(&key), Some(key.clone()));
                        if i % 2 == 0 {
                            ledger.delete(&key);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.len(), 8 * 100);
    }
}
