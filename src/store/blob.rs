//! The blob store port (§4.D): `put(name, bytes, mime) -> url`,
//! `get(name) -> bytes`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// Capability port for content-addressed blob storage (uploaded
/// document originals, large artifact payloads referenced by
/// `{"blob_ref": "..."}`).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `name`, returning an opaque reference URL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::BlobUnavailable`] if the
    /// store cannot be reached.
    async fn put(&self, name: &str, bytes: Vec<u8>, mime: &str) -> Result<String>;

    /// Fetches bytes previously stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::NotFoundError`] if `name` was never
    /// stored, or [`crate::error::StoreError::BlobUnavailable`] if the
    /// store cannot be reached.
    async fn get(&self, name: &str) -> Result<Vec<u8>>;
}

struct Blob {
    bytes: Vec<u8>,
    mime: String,
}

/// In-memory blob store; reference URLs are `mock://<name>`.
#[derive(Default)]
pub struct MockBlobStore {
    blobs: Mutex<HashMap<String, Blob>>,
}

impl MockBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>, mime: &str) -> Result<String> {
        let mut blobs = self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        blobs.insert(
            name.to_string(),
            Blob {
                bytes,
                mime: mime.to_string(),
            },
        );
        Ok(format!("mock://{name}"))
    }

    async fn get(&self, name: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        blobs
            .get(name)
            .map(|blob| blob.bytes.clone())
            .ok_or_else(|| crate::error::Error::from(crate::error::NotFoundError::Artifact {
                doc_id: name.to_string(),
                artifact_type: "blob".to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MockBlobStore::new();
        let url = store.put("doc.txt", b"hello".to_vec(), "text/plain").await.unwrap();
        assert_eq!(url, "mock://doc.txt");
        assert_eq!(store.get("doc.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_blob_is_not_found() {
        let store = MockBlobStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert_eq!(err.code(), "NotFound");
    }
}
