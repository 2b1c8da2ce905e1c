use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared in-memory map living for one pipeline run.
#[derive(Clone)]
pub struct Cache<K, V>
where
    K: Eq + Hash + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    name: &'static str,
    inner: Arc<Mutex<HashMap<K, V>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Debug + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let cache = self.inner.lock().await;
        let value = cache.get(key).cloned();
        if value.is_some() {
            debug!(cache = self.name, ?key, "Cache HIT");
        } else {
            debug!(cache = self.name, ?key, "Cache MISS");
        }
        value
    }

    pub async fn put(&self, key: K, value: V) {
        let mut cache = self.inner.lock().await;
        debug!(cache = self.name, ?key, "Cache PUT");
        cache.insert(key, value);
    }

    /// Returns the cached value, or inserts the one built by `make` while
    /// holding the lock so concurrent callers share a single entry.
    pub async fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> V {
        let mut cache = self.inner.lock().await;
        if let Some(value) = cache.get(&key) {
            debug!(cache = self.name, ?key, "Cache HIT");
            return value.clone();
        }
        debug!(cache = self.name, ?key, "Cache MISS");
        let value = make();
        cache.insert(key, value.clone());
        value
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.inner.lock().await.contains_key(key)
    }
}
