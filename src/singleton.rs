// Parameterized instance registry.
// Hands out one shared instance per distinct set of construction parameters.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Caller-owned registry of shared instances keyed by construction parameters.
#[derive(Debug)]
pub struct Registry<K, V> {
    instances: Mutex<HashMap<K, Arc<V>>>,
}

impl<K, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V> Registry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the instance for `key`, building it with `create` on first use.
    ///
    /// `create` runs at most once per key. The registry stays locked while it
    /// runs, so it must not call back into this registry.
    pub fn get_or_create<F>(&self, key: K, create: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        self.lock()
            .entry(key)
            .or_insert_with(|| Arc::new(create()))
            .clone()
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Drop the registry's handle for `key`. Outstanding `Arc`s stay valid.
    pub fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Arc<V>>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
