//! The KV cache port (§4.D): `get`/`set`/`del` with TTL, and an atomic
//! `set_if_absent`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;

/// Capability port for a TTL-aware key/value cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetches a value, returning `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::KvUnavailable`] if the
    /// store cannot be reached.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value with an optional TTL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::KvUnavailable`] if the
    /// store cannot be reached.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Deletes a key; no error if absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::KvUnavailable`] if the
    /// store cannot be reached.
    async fn del(&self, key: &str) -> Result<()>;

    /// Sets `value` only if `key` is absent or expired; returns `true`
    /// if the set happened.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::KvUnavailable`] if the
    /// store cannot be reached.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|exp| Instant::now() < exp)
    }
}

/// In-memory KV store.
#[derive(Default)]
pub struct MockKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MockKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MockKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).filter(|e| e.is_live()).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if entries.get(key).is_some_and(Entry::is_live) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|d| Instant::now() + d),
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = MockKvStore::new();
        store.set("k", b"v".to_vec(), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MockKvStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_is_treated_as_absent() {
        let store = MockKvStore::new();
        store.set("k", b"v".to_vec(), Some(Duration::from_millis(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_if_absent_is_atomic_against_existing_key() {
        let store = MockKvStore::new();
        assert!(store.set_if_absent("k", b"first".to_vec(), None).await.unwrap());
        assert!(!store.set_if_absent("k", b"second".to_vec(), None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn del_removes_the_key() {
        let store = MockKvStore::new();
        store.set("k", b"v".to_vec(), None).await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
