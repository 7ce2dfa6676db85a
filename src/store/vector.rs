//! The vector store port (§4.D): `upsert(collection, id, vector,
//! payload)`, `search(collection, vector, k, filter) ->
//! (id, score, payload)*`.
//!
//! `MockVectorStore` reuses the teacher's brute-force cosine-similarity
//! scan (`search::semantic_search`) rather than linking `usearch`
//! unconditionally; a real HNSW-backed implementation can be added
//! behind the `usearch-hnsw` feature without changing this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::Result;

/// One scored hit returned by [`VectorStore::search`].
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// The id the vector was upserted under.
    pub id: String,
    /// Cosine similarity score in `[-1, 1]`.
    pub score: f32,
    /// Opaque payload stored alongside the vector.
    pub payload: serde_json::Value,
}

/// Capability port for nearest-neighbor vector search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Inserts or replaces a vector under `id` in `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::VectorUnavailable`] if the
    /// store cannot be reached.
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> Result<()>;

    /// Returns the `k` nearest neighbors of `vector` in `collection`,
    /// descending by score.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::VectorUnavailable`] if the
    /// store cannot be reached.
    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>>;

    /// Removes a vector by id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::VectorUnavailable`] if the
    /// store cannot be reached.
    async fn remove(&self, collection: &str, id: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    vector: Vec<f32>,
    payload: serde_json::Value,
}

/// In-memory, brute-force vector store.
#[derive(Default)]
pub struct MockVectorStore {
    collections: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl MockVectorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> Result<()> {
        let mut collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), Entry { vector, payload });
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<VectorHit> = entries
            .iter()
            .map(|(id, entry)| VectorHit {
                id: id.clone(),
                score: cosine_similarity(vector, &entry.vector),
                payload: entry.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entries) = collections.get_mut(collection) {
            entries.remove(id);
        }
        Ok(())
    }
}

/// Real HNSW-backed [`VectorStore`], one index per collection.
///
/// Behind the `usearch-hnsw` feature; [`MockVectorStore`]'s brute-force
/// scan is the default so the engine runs without a native dependency.
#[cfg(feature = "usearch-hnsw")]
pub struct UsearchVectorStore {
    collections: Mutex<HashMap<String, CollectionIndex>>,
}

#[cfg(feature = "usearch-hnsw")]
struct CollectionIndex {
    index: crate::search::hnsw::HnswIndex,
    payloads: HashMap<i64, serde_json::Value>,
}

#[cfg(feature = "usearch-hnsw")]
impl Default for UsearchVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "usearch-hnsw")]
impl UsearchVectorStore {
    /// Creates an empty store; indices are created lazily per
    /// collection, sized to the dimensionality of the first upsert.
    #[must_use]
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
        }
    }
}

#[cfg(feature = "usearch-hnsw")]
#[async_trait]
impl VectorStore for UsearchVectorStore {
    async fn upsert(&self, collection: &str, id: &str, vector: Vec<f32>, payload: serde_json::Value) -> Result<()> {
        let chunk_id: i64 = id
            .parse()
            .map_err(|_| crate::error::Error::from(crate::error::StoreError::VectorUnavailable {
                reason: format!("usearch vector store requires integer ids, got {id:?}"),
            }))?;
        let mut collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = match collections.entry(collection.to_string()) {
            std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
            std::collections::hash_map::Entry::Vacant(entry) => entry.insert(CollectionIndex {
                index: crate::search::hnsw::HnswIndex::new(&crate::search::hnsw::HnswConfig::with_dimensions(vector.len()))?,
                payloads: HashMap::new(),
            }),
        };
        entry.index.add(chunk_id, &vector)?;
        entry.payloads.insert(chunk_id, payload);
        Ok(())
    }

    async fn search(&self, collection: &str, vector: &[f32], k: usize) -> Result<Vec<VectorHit>> {
        let collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let hits = entry.index.search(vector, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| VectorHit {
                id: hit.chunk_id.to_string(),
                score: hit.similarity,
                payload: entry.payloads.get(&hit.chunk_id).cloned().unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    async fn remove(&self, collection: &str, id: &str) -> Result<()> {
        let Ok(chunk_id) = id.parse::<i64>() else {
            return Ok(());
        };
        let mut collections = self.collections.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(entry) = collections.get_mut(collection) {
            entry.index.remove(chunk_id)?;
            entry.payloads.remove(&chunk_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn search_ranks_by_similarity() {
        let store = MockVectorStore::new();
        store.upsert("c1", "a", vec![1.0, 0.0], serde_json::json!({})).await.unwrap();
        store.upsert("c1", "b", vec![0.0, 1.0], serde_json::json!({})).await.unwrap();

        let hits = store.search("c1", &[1.0, 0.0], 2).await.unwrap();
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn search_respects_k() {
        let store = MockVectorStore::new();
        for i in 0..5 {
            store.upsert("c1", &i.to_string(), vec![1.0, i as f32], serde_json::json!({})).await.unwrap();
        }
        assert_eq!(store.search("c1", &[1.0, 0.0], 3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn unknown_collection_returns_empty() {
        let store = MockVectorStore::new();
        assert!(store.search("missing", &[1.0], 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_drops_the_vector() {
        let store = MockVectorStore::new();
        store.upsert("c1", "a", vec![1.0], serde_json::json!({})).await.unwrap();
        store.remove("c1", "a").await.unwrap();
        assert!(store.search("c1", &[1.0], 5).await.unwrap().is_empty());
    }
}
