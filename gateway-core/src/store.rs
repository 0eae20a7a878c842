//! Generic key/value storage used by the descriptor catalog.
//!
//! Two interchangeable implementations are provided: [`MapStorage`], an
//! unbounded concurrent map for state that must never be evicted implicitly
//! (the catalog cache), and [`CacheStorage`], a bounded cache for collaborators
//! that need a capacity limit.
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

/// A concurrent key → value store. A missing key is an absence, not an error.
pub trait Storage<K, V> {
    fn put(&self, key: K, value: V);

    fn get(&self, key: &K) -> Option<V>;

    fn remove(&self, key: &K);

    fn remove_all(&self);

    fn contains_key(&self, key: &K) -> bool;

    fn is_empty(&self) -> bool;

    /// An immutable point-in-time copy of the store's contents.
    fn snapshot(&self) -> HashMap<K, V>;
}

/// Unbounded storage backed by a read/write-locked map.
///
/// Readers never observe a partially applied bulk update: [`MapStorage::replace_all`]
/// swaps the whole map under the write lock.
#[derive(Debug, Default)]
pub struct MapStorage<K, V> {
    map: RwLock<HashMap<K, V>>,
}

impl<K, V> MapStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces the entire contents in one step.
    pub fn replace_all(&self, entries: HashMap<K, V>) {
        *self.map.write() = entries;
    }

    pub fn keys(&self) -> Vec<K> {
        self.map.read().keys().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.map.read().values().cloned().collect()
    }
}

impl<K, V> Storage<K, V> for MapStorage<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn put(&self, key: K, value: V) {
        self.map.write().insert(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.map.read().get(key).cloned()
    }

    fn remove(&self, key: &K) {
        self.map.write().remove(key);
    }

    fn remove_all(&self) {
        self.map.write().clear();
    }

    fn contains_key(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn snapshot(&self) -> HashMap<K, V> {
        self.map.read().clone()
    }
}

/// Bounded storage backed by an evicting cache.
///
/// Entries past the capacity limit are evicted by the cache's policy; callers
/// must tolerate a `get` miss for a key they previously stored.
#[derive(Debug)]
pub struct CacheStorage<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: moka::sync::Cache<K, V>,
}

impl<K, V> CacheStorage<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: moka::sync::Cache::new(capacity),
        }
    }
}

impl<K, V> Storage<K, V> for CacheStorage<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn put(&self, key: K, value: V) {
        self.cache.insert(key, value);
    }

    fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    fn remove(&self, key: &K) {
        self.cache.invalidate(key);
    }

    fn remove_all(&self) {
        self.cache.invalidate_all();
    }

    fn contains_key(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }

    fn is_empty(&self) -> bool {
        self.cache.run_pending_tasks();
        self.cache.entry_count() == 0
    }

    fn snapshot(&self) -> HashMap<K, V> {
        self.cache
            .iter()
            .map(|(key, value)| ((*key).clone(), value))
            .collect()
    }
}
