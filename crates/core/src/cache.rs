use std::thread;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::{KvStore, Namespace};

pub const DEFAULT_HIT_DELAY_MS: u64 = 1500;

/// Content-addressed cache of model results.
///
/// A hit waits `hit_delay` before returning so a cached answer does not look
/// instantaneous to the user. The delay is part of the behaviour; tests set
/// it to zero.
pub struct ResponseCache {
    store: Box<dyn KvStore>,
    hit_delay: Duration,
}

impl ResponseCache {
    pub fn new(store: Box<dyn KvStore>, hit_delay: Duration) -> Self {
        Self { store, hit_delay }
    }

    /// Returns the decoded entry under `key`, or `None` when it is absent or
    /// unreadable. Does not apply the hit delay.
    pub fn lookup<T: DeserializeOwned>(&self, namespace: Namespace, key: &str) -> Result<Option<T>> {
        let Some(bytes) = self.store.get(namespace, key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(
                    namespace = namespace.as_str(),
                    key,
                    error = %err,
                    "discarding unreadable cache entry"
                );
                Ok(None)
            }
        }
    }

    /// Serves `key` from the store, or runs `compute` and persists its
    /// result. Nothing is written when `compute` fails.
    pub fn get_or_compute<T, F>(&self, namespace: Namespace, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.lookup(namespace, key)? {
            debug!(namespace = namespace.as_str(), key, "cache hit");
            if !self.hit_delay.is_zero() {
                thread::sleep(self.hit_delay);
            }
            return Ok(value);
        }
        debug!(namespace = namespace.as_str(), key, "cache miss");
        let value = compute()?;
        let bytes = serde_json::to_vec_pretty(&value)?;
        self.store.put(namespace, key, &bytes)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::store::{FsStore, MemoryStore};
    use serde_json::{json, Value};
    use std::cell::Cell;
    use std::sync::Arc;
    use std::time::Instant;
    use tempfile::tempdir;

    fn memory_cache(delay_ms: u64) -> (Arc<MemoryStore>, ResponseCache) {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(Box::new(store.clone()), Duration::from_millis(delay_ms));
        (store, cache)
    }

    #[test]
    fn second_lookup_skips_compute() {
        let (_, cache) = memory_cache(0);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok(json!({"total": 10}))
        };
        let first: Value = cache.get_or_compute(Namespace::Queries, "k", compute).unwrap();
        let second: Value = cache
            .get_or_compute(Namespace::Queries, "k", || {
                calls.set(calls.get() + 1);
                Ok(json!({"total": 99}))
            })
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failed_compute_writes_nothing() {
        let (store, cache) = memory_cache(0);
        let result: Result<Value> = cache.get_or_compute(Namespace::Documents, "k", || {
            Err(LedgerError::Gateway("boom".to_string()))
        });
        assert!(matches!(result, Err(LedgerError::Gateway(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn hit_waits_for_configured_delay() {
        let (_, cache) = memory_cache(60);
        let _: Value = cache
            .get_or_compute(Namespace::Reports, "k", || Ok(json!(1)))
            .unwrap();
        let started = Instant::now();
        let _: Value = cache
            .get_or_compute(Namespace::Reports, "k", || Ok(json!(2)))
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn miss_does_not_wait() {
        let (_, cache) = memory_cache(5_000);
        let started = Instant::now();
        let _: Value = cache
            .get_or_compute(Namespace::Reports, "fresh", || Ok(json!(1)))
            .unwrap();
        assert!(started.elapsed() < Duration::from_millis(5_000));
    }

    #[test]
    fn corrupt_entry_is_recomputed_and_overwritten() {
        let (store, cache) = memory_cache(0);
        store
            .put(Namespace::Documents, "k", b"{\"truncated\": ")
            .unwrap();
        let value: Value = cache
            .get_or_compute(Namespace::Documents, "k", || Ok(json!({"ok": true})))
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
        let stored = store.get(Namespace::Documents, "k").unwrap().unwrap();
        let reparsed: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(reparsed, json!({"ok": true}));
    }

    #[test]
    fn persisted_json_keeps_non_ascii_text() {
        let dir = tempdir().unwrap();
        let store = FsStore::open(dir.path()).unwrap();
        let cache = ResponseCache::new(Box::new(store.clone()), Duration::ZERO);
        let _: Value = cache
            .get_or_compute(Namespace::Queries, "abc", || Ok(json!({"answer_text": "مصروف"})))
            .unwrap();
        let raw = std::fs::read_to_string(store.entry_path(Namespace::Queries, "abc")).unwrap();
        assert!(raw.contains("مصروف"));
        assert!(!raw.contains("\\u"));
        assert!(raw.contains('\n'));
    }
}
