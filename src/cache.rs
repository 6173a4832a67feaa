//! Handler-scoped result cache with TTL eviction.
//!
//! Entries are keyed by `(handler_id, request_key)`. An entry written with a
//! TTL records an absolute expiry instant and schedules an eviction task;
//! reads treat an expired entry as absent even if the task has not fired yet
//! (lazy expiry as a safety net against timer drift). Re-writing a key
//! cancels the pending eviction of the old entry so a stale timer can never
//! remove a freshly written value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::Mutex;
use serde_json::Value;

use crate::request::Request;

type KeyFn = Arc<dyn Fn(&Request) -> Result<String> + Send + Sync>;

/// Per-route cache configuration.
///
/// The default request key is the canonical JSON serialization of the body
/// (object keys are emitted in sorted order). Keys are namespaced per
/// handler, so collisions are only possible between deliberately crafted,
/// structurally equal bodies sent to the *same* handler.
#[derive(Clone, Default)]
pub struct CacheConfig {
    ttl: Option<Duration>,
    key: Option<KeyFn>,
}

impl CacheConfig {
    /// Creates a configuration with no TTL and the default key function.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the entry time-to-live. Entries without a TTL live until
    /// explicitly invalidated.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Replaces the default key function.
    #[must_use]
    pub fn key<F>(mut self, key: F) -> Self
    where
        F: Fn(&Request) -> Result<String> + Send + Sync + 'static,
    {
        self.key = Some(Arc::new(key));
        self
    }

    pub(crate) fn ttl_value(&self) -> Option<Duration> {
        self.ttl
    }

    /// Derives the cache key for a request. A failing custom key function is
    /// a cache-unavailable condition; the dispatcher logs it and skips
    /// caching for that request.
    pub(crate) fn derive_key(&self, request: &Request) -> Result<String> {
        match &self.key {
            Some(key) => key(request),
            None => Ok(serde_json::to_string(request.body())?),
        }
    }
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
    generation: u64,
    evictor: Option<tokio::task::JoinHandle<()>>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        // Removing an entry for any reason cancels its pending eviction.
        if let Some(evictor) = &self.evictor {
            evictor.abort();
        }
    }
}

#[derive(Default)]
struct Store {
    handlers: Mutex<HashMap<String, HashMap<String, Entry>>>,
    generation: AtomicU64,
}

/// A per-handler map from derived request keys to previously computed
/// results, with TTL expiry and explicit invalidation.
///
/// Safe to share across concurrently dispatched requests; readers observe
/// either the old or the new entry of a concurrent write, never a torn one.
#[derive(Clone, Default)]
pub struct HandlerCache {
    store: Arc<Store>,
}

impl HandlerCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Default::default()
    }

    /// Ensures a bucket exists for `handler_id`.
    pub fn register_handler(&self, handler_id: &str) {
        self.store
            .handlers
            .lock()
            .entry(handler_id.to_string())
            .or_default();
    }

    /// Whether a live entry exists for `(handler_id, key)`. An entry past
    /// its expiry is purged and reported absent.
    pub fn has_entry(&self, handler_id: &str, key: &str) -> bool {
        self.get_entry(handler_id, key).is_some()
    }

    /// Returns the live entry for `(handler_id, key)`, purging it first if
    /// its expiry has passed.
    pub fn get_entry(&self, handler_id: &str, key: &str) -> Option<Value> {
        let mut handlers = self.store.handlers.lock();
        let bucket = handlers.get_mut(handler_id)?;
        let expired = matches!(
            bucket.get(key),
            Some(Entry { expires_at: Some(at), .. }) if *at <= Instant::now()
        );
        if expired {
            bucket.remove(key);
            return None;
        }
        bucket.get(key).map(|entry| entry.value.clone())
    }

    /// Writes an entry, replacing any previous entry for the key and
    /// cancelling its pending eviction. With a TTL, an eviction task removes
    /// the entry once the TTL elapses.
    ///
    /// Eager eviction requires a running tokio runtime; expiry is also
    /// enforced lazily on every read.
    pub fn set_entry(&self, handler_id: &str, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let key = key.into();
        let generation = self.store.generation.fetch_add(1, Ordering::Relaxed);

        let evictor = ttl.map(|ttl| {
            let store = Arc::downgrade(&self.store);
            let handler_id = handler_id.to_string();
            let key = key.clone();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                evict(store, &handler_id, &key, generation);
            })
        });

        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
            generation,
            evictor,
        };
        self.store
            .handlers
            .lock()
            .entry(handler_id.to_string())
            .or_default()
            .insert(key, entry);
    }

    /// Invalidates one entry, or every entry for the handler when `key` is
    /// `None`. Pending evictions of removed entries are cancelled.
    pub fn invalidate_entry(&self, handler_id: &str, key: Option<&str>) {
        let mut handlers = self.store.handlers.lock();
        let bucket = match handlers.get_mut(handler_id) {
            Some(bucket) => bucket,
            None => return,
        };
        match key {
            Some(key) => {
                bucket.remove(key);
            }
            None => bucket.clear(),
        }
    }

    /// The number of entries currently stored for a handler, expired or not.
    pub fn entry_count(&self, handler_id: &str) -> usize {
        self.store
            .handlers
            .lock()
            .get(handler_id)
            .map(|bucket| bucket.len())
            .unwrap_or(0)
    }
}

/// Scheduled removal. The generation check makes a stale timer a no-op when
/// the key was re-written after this eviction was scheduled.
fn evict(store: Weak<Store>, handler_id: &str, key: &str, generation: u64) {
    let store = match store.upgrade() {
        Some(store) => store,
        None => return,
    };
    let mut handlers = store.handlers.lock();
    if let Some(bucket) = handlers.get_mut(handler_id) {
        if bucket.get(key).map(|entry| entry.generation) == Some(generation) {
            bucket.remove(key);
            tracing::debug!(handler_id = %handler_id, key = %key, "cache entry expired");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::protocol::Protocol;

    const TTL: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn set_get_roundtrip() {
        let cache = HandlerCache::new();
        cache.set_entry("GET /users", "k", json!({"a": 1}), None);
        assert!(cache.has_entry("GET /users", "k"));
        assert_eq!(cache.get_entry("GET /users", "k"), Some(json!({"a": 1})));
        assert!(!cache.has_entry("GET /users", "other"));
        assert!(!cache.has_entry("POST /users", "k"));
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = HandlerCache::new();
        cache.set_entry("h", "k", json!(1), Some(TTL));
        assert!(cache.has_entry("h", "k"));

        tokio::time::sleep(TTL * 3).await;
        assert!(!cache.has_entry("h", "k"));
        assert_eq!(cache.entry_count("h"), 0);
    }

    #[tokio::test]
    async fn expired_entry_is_absent_even_before_eviction_fires() {
        let cache = HandlerCache::new();
        // TTL of zero: the entry is expired immediately, well before the
        // scheduled eviction task gets a chance to run.
        cache.set_entry("h", "k", json!(1), Some(Duration::from_millis(0)));
        assert!(!cache.has_entry("h", "k"));
        assert!(cache.get_entry("h", "k").is_none());
    }

    #[tokio::test]
    async fn rewrite_cancels_stale_eviction() {
        let cache = HandlerCache::new();
        cache.set_entry("h", "k", json!("old"), Some(TTL));
        // Re-set with a longer TTL before the first one fires.
        cache.set_entry("h", "k", json!("new"), Some(TTL * 10));

        tokio::time::sleep(TTL * 3).await;
        assert_eq!(cache.get_entry("h", "k"), Some(json!("new")));
    }

    #[tokio::test]
    async fn invalidate_single_and_all() {
        let cache = HandlerCache::new();
        cache.set_entry("h", "k1", json!(1), Some(TTL * 100));
        cache.set_entry("h", "k2", json!(2), None);

        cache.invalidate_entry("h", Some("k1"));
        assert!(!cache.has_entry("h", "k1"));
        assert!(cache.has_entry("h", "k2"));

        cache.invalidate_entry("h", None);
        assert_eq!(cache.entry_count("h"), 0);
    }

    #[tokio::test]
    async fn default_key_is_canonical_json() {
        let config = CacheConfig::new();
        // Same structure, different key insertion order.
        let a = Request::new(Protocol::Post, "/x", json!({"a": 1, "b": 2}));
        let b = Request::new(Protocol::Post, "/x", json!({"b": 2, "a": 1}));
        assert_eq!(
            config.derive_key(&a).unwrap(),
            config.derive_key(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn custom_key_function() {
        let config = CacheConfig::new().key(|request| {
            Ok(request.body()["id"].to_string())
        });
        let request = Request::new(Protocol::Post, "/x", json!({"id": 7, "noise": "x"}));
        assert_eq!(config.derive_key(&request).unwrap(), "7");
    }
}
