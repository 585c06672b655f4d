//! The shared key-value data store.
//!
//! Guard expressions, render code, rule actions, and watcher runtimes all
//! communicate through this map: watchers write observations under fixed
//! keys (`"vision"`, `"audio"`, `"volume"`), rendered code reads them via
//! `getData` and writes scratch values via `setData`. Values are arbitrary
//! JSON; writes are whole-key replacements, last-write-wins. Readers
//! tolerate stale-by-one-frame data, so a single `RwLock` held per
//! operation is sufficient.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Cheaply-cloneable handle to the shared store.
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    inner: Arc<RwLock<HashMap<String, Value>>>,
}

impl DataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.read().expect("data store lock").get(key).cloned()
    }

    /// Get a value by key, or `default` if absent.
    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Set a value, replacing any previous value for the key.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner
            .write()
            .expect("data store lock")
            .insert(key.into(), value);
    }

    /// Remove a key, returning the previous value if any.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.write().expect("data store lock").remove(key)
    }

    /// Copy out the full map.
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.inner.read().expect("data store lock").clone()
    }

    /// Remove all keys.
    pub fn clear(&self) {
        self.inner.write().expect("data store lock").clear();
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.inner.read().expect("data store lock").len()
    }

    /// Check if the store has no keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_roundtrip() {
        let store = DataStore::new();
        store.set("vision", json!({"person": true}));
        assert_eq!(store.get("vision"), Some(json!({"person": true})));
        assert_eq!(store.get("missing"), None);
    }

    #[test]
    fn test_last_write_wins() {
        let store = DataStore::new();
        store.set("volume", json!(0.2));
        store.set("volume", json!(0.9));
        assert_eq!(store.get("volume"), Some(json!(0.9)));
    }

    #[test]
    fn test_clones_share_state() {
        let store = DataStore::new();
        let other = store.clone();
        other.set("k", json!(1));
        assert_eq!(store.get("k"), Some(json!(1)));
    }

    #[test]
    fn test_clear() {
        let store = DataStore::new();
        store.set("a", json!(1));
        store.set("b", json!(2));
        store.clear();
        assert!(store.is_empty());
    }
}
