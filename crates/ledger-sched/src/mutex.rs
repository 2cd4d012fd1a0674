//! Keyed mutex: serializes operations by an arbitrary set of string keys
//! (`handleJoint`/`write`/`aa_triggers`/per-device operations all go
//! through this). Key acquisition order is canonicalized — sorted
//! lexicographically — so that two callers locking the same key set in a
//! different order can never deadlock against each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};
use tracing::trace;

/// Registry of per-key locks. Locks are created lazily and never removed;
/// the key space here (device addresses, a handful of fixed operation
/// names) is small and bounded, so the registry does not need eviction.
#[derive(Default)]
pub struct KeyedMutex {
    locks: std::sync::Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

/// Holds the guards for every key a `lock`/`lock_or_skip` call acquired.
/// Dropping it releases them in reverse acquisition order.
pub struct KeyGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    /// Sorted, deduplicated key order — the single global rule every
    /// caller follows so that concurrent multi-key locks never deadlock.
    fn canonical_keys(keys: &[String]) -> Vec<String> {
        let mut sorted: Vec<String> = keys.to_vec();
        sorted.sort();
        sorted.dedup();
        sorted
    }

    /// Acquires every key in `keys`, blocking until all are held.
    pub async fn lock(&self, keys: &[String]) -> KeyGuard {
        let ordered = Self::canonical_keys(keys);
        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            trace!(%key, "acquiring key lock");
            let lock = self.entry(key);
            guards.push(lock.lock_owned().await);
        }
        KeyGuard { _guards: guards }
    }

    /// Attempts to acquire every key in `keys` without blocking. Returns
    /// `None`, releasing any partial acquisitions, if any key is already
    /// held — the `lockOrSkip` spec.md names for operations that should be
    /// dropped rather than queued when already in progress.
    pub fn lock_or_skip(&self, keys: &[String]) -> Option<KeyGuard> {
        let ordered = Self::canonical_keys(keys);
        let mut guards = Vec::with_capacity(ordered.len());
        for key in &ordered {
            let lock = self.entry(key);
            match lock.try_lock_owned() {
                Ok(guard) => guards.push(guard),
                Err(_) => return None,
            }
        }
        Some(KeyGuard { _guards: guards })
    }

    /// True if any of `keys` is currently held by someone else.
    pub fn is_any_of_keys_locked(&self, keys: &[String]) -> bool {
        keys.iter().any(|key| {
            let lock = self.entry(key);
            match lock.try_lock() {
                Ok(_) => false,
                Err(_) => true,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_serializes_same_key() {
        let mutex = KeyedMutex::new();
        let _guard = mutex.lock(&["device-a".to_string()]).await;
        assert!(mutex.is_any_of_keys_locked(&["device-a".to_string()]));
        assert!(!mutex.is_any_of_keys_locked(&["device-b".to_string()]));
    }

    #[tokio::test]
    async fn lock_or_skip_fails_when_held() {
        let mutex = KeyedMutex::new();
        let _guard = mutex.lock(&["write".to_string()]).await;
        assert!(mutex.lock_or_skip(&["write".to_string()]).is_none());
    }

    #[tokio::test]
    async fn lock_or_skip_succeeds_when_free() {
        let mutex = KeyedMutex::new();
        let guard = mutex.lock_or_skip(&["write".to_string()]);
        assert!(guard.is_some());
    }

    #[tokio::test]
    async fn canonical_order_is_independent_of_caller_order() {
        let mutex = KeyedMutex::new();
        let keys_a = vec!["b".to_string(), "a".to_string()];
        let keys_b = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            KeyedMutex::canonical_keys(&keys_a),
            KeyedMutex::canonical_keys(&keys_b)
        );
    }
}
