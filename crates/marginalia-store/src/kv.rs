//! The key-value backend beneath the local cache, and an in-memory
//! implementation of it.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use marginalia_core::WriteError;

use crate::StoreError;

/// A durable string-keyed, string-valued store without transactions.
///
/// Operations on distinct keys are independent and may run concurrently.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), WriteError>;

    /// Remove `key`. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), WriteError>;

    /// All keys starting with `prefix`, in ascending order.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Volatile [`KeyValueStore`] with an optional byte quota.
///
/// The quota counts key and value bytes of every entry, like browser
/// storage does. `set_unavailable` simulates a backend that went away.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, WriteError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(WriteError::Unavailable("memory store disabled".into()));
        }
        self.entries
            .lock()
            .map_err(|_| WriteError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), WriteError> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(WriteError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WriteError> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let entries = self
            .lock()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.put("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn prefix_scan_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        for key in ["b/2", "a/1", "b/1", "c/1", "b"] {
            store.put(key, "x").await.unwrap();
        }
        assert_eq!(store.keys_with_prefix("b/").await.unwrap(), vec!["b/1", "b/2"]);
        assert_eq!(store.keys_with_prefix("").await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn quota_counts_replaced_values_once() {
        let store = MemoryStore::with_quota(10);
        store.put("k", "12345").await.unwrap();
        store.put("k", "123456789").await.unwrap();
        assert_eq!(store.put("k", "1234567890").await, Err(WriteError::QuotaExceeded));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("123456789"));
    }

    #[tokio::test]
    async fn unavailable_rejects_everything() {
        let store = MemoryStore::new();
        store.put("k", "v").await.unwrap();
        store.set_unavailable(true);
        assert!(matches!(store.put("k", "w").await, Err(WriteError::Unavailable(_))));
        assert!(store.get("k").await.is_err());
        store.set_unavailable(false);
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
