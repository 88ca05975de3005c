//! Platform-specific bounded cache implementations.
//!
//! Provides a unified API over mini-moka-wasm's sync (native) and unsync (WASM) caches.
//! Native uses the sync cache (thread-safe).
//! WASM uses the unsync cache wrapped in Arc<Mutex<>> (single-threaded but needs interior mutability).

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::time::Duration;

    pub type Cache<K, V> = mini_moka_wasm::sync::Cache<K, V>;

    pub fn new_cache<K, V>(max_capacity: u64, ttl: Option<Duration>) -> Cache<K, V>
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        let builder = mini_moka_wasm::sync::Cache::builder().max_capacity(max_capacity);
        match ttl {
            Some(ttl) => builder.time_to_live(ttl).build(),
            None => builder.build(),
        }
    }

    pub fn get<K, V>(cache: &Cache<K, V>, key: &K) -> Option<V>
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        cache.get(key)
    }

    pub fn insert<K, V>(cache: &Cache<K, V>, key: K, value: V)
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        cache.insert(key, value);
    }

    pub fn clear<K, V>(cache: &Cache<K, V>)
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        cache.invalidate_all();
    }

    pub fn len<K, V>(cache: &Cache<K, V>) -> usize
    where
        K: std::hash::Hash + Eq + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
    {
        cache.iter().count()
    }
}

#[cfg(target_arch = "wasm32")]
mod wasm {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    pub type Cache<K, V> = Arc<Mutex<mini_moka_wasm::unsync::Cache<K, V>>>;

    pub fn new_cache<K, V>(max_capacity: u64, ttl: Option<Duration>) -> Cache<K, V>
    where
        K: std::hash::Hash + Eq + 'static,
        V: Clone + 'static,
    {
        let builder = mini_moka_wasm::unsync::Cache::builder().max_capacity(max_capacity);
        let cache = match ttl {
            Some(ttl) => builder.time_to_live(ttl).build(),
            None => builder.build(),
        };
        Arc::new(Mutex::new(cache))
    }

    pub fn get<K, V>(cache: &Cache<K, V>, key: &K) -> Option<V>
    where
        K: std::hash::Hash + Eq + 'static,
        V: Clone + 'static,
    {
        cache.lock().ok()?.get(key).cloned()
    }

    pub fn insert<K, V>(cache: &Cache<K, V>, key: K, value: V)
    where
        K: std::hash::Hash + Eq + 'static,
        V: Clone + 'static,
    {
        if let Ok(mut cache) = cache.lock() {
            cache.insert(key, value);
        }
    }

    pub fn clear<K, V>(cache: &Cache<K, V>)
    where
        K: std::hash::Hash + Eq + 'static,
        V: Clone + 'static,
    {
        if let Ok(mut cache) = cache.lock() {
            cache.invalidate_all();
        }
    }

    pub fn len<K, V>(cache: &Cache<K, V>) -> usize
    where
        K: std::hash::Hash + Eq + 'static,
        V: Clone + 'static,
    {
        cache.lock().map(|cache| cache.iter().count()).unwrap_or(0)
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::*;

#[cfg(target_arch = "wasm32")]
pub use wasm::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get() {
        let cache = new_cache::<String, u32>(16, None);
        insert(&cache, "answer".to_string(), 42);
        assert_eq!(get(&cache, &"answer".to_string()), Some(42));
        assert_eq!(get(&cache, &"missing".to_string()), None);
    }
}
