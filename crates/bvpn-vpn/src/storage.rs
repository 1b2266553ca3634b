//! Key-Value Store
//!
//! String-keyed, string-valued preference storage with per-key
//! observation. The on-disk format belongs to the platform; the app only
//! needs `get`, `set` and `observe`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

/// Stream of a key's value: current value first, then every change.
pub type ValueStream = WatchStream<Option<String>>;

/// Storage errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("Encode error for {key}: {reason}")]
    Encode { key: String, reason: String },

    #[error("Decode error for {key}: {reason}")]
    Decode { key: String, reason: String },
}

/// Platform key-value store
pub trait KeyValueStore: Send + Sync + 'static {
    /// Stored value, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value and notify observers.
    fn set(&self, key: &str, value: String);

    /// Observe a key, starting with its current value.
    fn observe(&self, key: &str) -> ValueStream;
}

/// In-process store backed by one watch channel per key.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, watch::Sender<Option<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Option<String>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys that hold a value.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|tx| tx.borrow().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).and_then(|tx| tx.borrow().clone())
    }

    fn set(&self, key: &str, value: String) {
        trace!(key, "Preference stored");
        let mut entries = self.lock();
        match entries.get(key) {
            Some(tx) => {
                tx.send_replace(Some(value));
            }
            None => {
                let (tx, _rx) = watch::channel(Some(value));
                entries.insert(key.to_string(), tx);
            }
        }
    }

    fn observe(&self, key: &str) -> ValueStream {
        let mut entries = self.lock();
        let tx = entries
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0);
        WatchStream::new(tx.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[test]
    fn test_get_set() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("device_token"), None);

        store.set("device_token", "abc".into());
        assert_eq!(store.get("device_token").as_deref(), Some("abc"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_observe_missing_key_then_set() {
        let store = MemoryStore::new();
        let mut values = store.observe("selected_city");
        assert_eq!(values.next().await, Some(None));

        store.set("selected_city", "{}".into());
        assert_eq!(values.next().await, Some(Some("{}".to_string())));
    }

    #[tokio::test]
    async fn test_observe_existing_key_starts_with_value() {
        let store = MemoryStore::new();
        store.set("dns", "\"google\"".into());

        let mut values = store.observe("dns");
        assert_eq!(values.next().await, Some(Some("\"google\"".to_string())));
    }
}
