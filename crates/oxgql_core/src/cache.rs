//! Pluggable caches for parsed documents and persisted queries.

use lru::LruCache as InnerLru;
use rustc_hash::FxHashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// A shared key/value cache.
///
/// Implementations are consulted from concurrent requests; interior
/// mutability is the implementor's concern.
pub trait Cache<V: Clone>: Send + Sync {
    fn get(&self, key: &str) -> Option<V>;
    fn insert(&self, key: String, value: V);
}

/// A cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl<V: Clone> Cache<V> for NoCache {
    fn get(&self, _key: &str) -> Option<V> {
        None
    }

    fn insert(&self, _key: String, _value: V) {}
}

/// Bounded least-recently-used cache.
pub struct LruCache<V> {
    inner: Mutex<InnerLru<String, V>>,
}

impl<V> LruCache<V> {
    /// Capacities below one are clamped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(InnerLru::new(capacity)),
        }
    }
}

impl<V: Clone + Send> Cache<V> for LruCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.inner.lock().ok()?;
        inner.get(key).cloned()
    }

    fn insert(&self, key: String, value: V) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.put(key, value);
        }
    }
}

/// Unbounded map-backed cache, mostly useful for pre-seeding in tests.
#[derive(Default)]
pub struct MapCache<V> {
    inner: Mutex<FxHashMap<String, V>>,
}

impl<V> MapCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(FxHashMap::default()),
        }
    }
}

impl<V: Clone + Send> Cache<V> for MapCache<V> {
    fn get(&self, key: &str) -> Option<V> {
        let inner = self.inner.lock().ok()?;
        inner.get(key).cloned()
    }

    fn insert(&self, key: String, value: V) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(key, value);
        }
    }
}
