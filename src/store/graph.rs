//! The graph store port (§4.D): `run(query, params) -> row*` and
//! `write(query, params)`. The real contract is a graph query
//! language; the Mock implements just enough of it (entity/relation
//! upsert and "entities linked to an entity matching a term") for the
//! Hybrid Retriever's graph leg and the Analyzer's `explore` stage.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;

/// An entity node in the knowledge graph.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphEntity {
    /// Stable entity id, normalized (lowercased, whitespace-collapsed).
    pub id: String,
    /// Display name as it appeared in source text.
    pub name: String,
    /// Entity kind (`person`, `org`, `concept`, `tech`, `place`,
    /// `event`, `product`).
    pub kind: String,
    /// Chunk ids this entity was extracted from.
    pub chunk_ids: Vec<i64>,
}

/// A directed relation between two entities.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphRelation {
    /// Source entity id.
    pub from: String,
    /// Target entity id.
    pub to: String,
    /// Relation kind (`defines`, `contains`, `influences`,
    /// `contrasts`, `uses`, `creates`, `belongs_to`, `related_to`).
    pub kind: String,
}

/// Capability port for the knowledge graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Upserts an entity, merging `chunk_ids` if it already exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::GraphUnavailable`] if the
    /// store cannot be reached.
    async fn upsert_entity(&self, doc_id: &str, entity: GraphEntity) -> Result<()>;

    /// Records a relation between two entities.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::GraphUnavailable`] if the
    /// store cannot be reached.
    async fn upsert_relation(&self, doc_id: &str, relation: GraphRelation) -> Result<()>;

    /// Finds entities in `doc_id` whose name contains `term`
    /// (case-insensitive) and returns the chunk ids linked to them,
    /// deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::GraphUnavailable`] if the
    /// store cannot be reached.
    async fn find_chunks_for_term(&self, doc_id: &str, term: &str) -> Result<Vec<i64>>;

    /// Returns all entities and relations recorded for a document.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StoreError::GraphUnavailable`] if the
    /// store cannot be reached.
    async fn get_graph(&self, doc_id: &str) -> Result<(Vec<GraphEntity>, Vec<GraphRelation>)>;
}

#[derive(Default)]
struct DocGraph {
    entities: HashMap<String, GraphEntity>,
    relations: Vec<GraphRelation>,
}

/// In-memory graph store keyed by document.
#[derive(Default)]
pub struct MockGraphStore {
    docs: Mutex<HashMap<String, DocGraph>>,
}

impl MockGraphStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn upsert_entity(&self, doc_id: &str, entity: GraphEntity) -> Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let graph = docs.entry(doc_id.to_string()).or_default();
        graph
            .entities
            .entry(entity.id.clone())
            .and_modify(|existing| {
                for chunk_id in &entity.chunk_ids {
                    if !existing.chunk_ids.contains(chunk_id) {
                        existing.chunk_ids.push(*chunk_id);
                    }
                }
            })
            .or_insert(entity);
        Ok(())
    }

    async fn upsert_relation(&self, doc_id: &str, relation: GraphRelation) -> Result<()> {
        let mut docs = self.docs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let graph = docs.entry(doc_id.to_string()).or_default();
        if !graph
            .relations
            .iter()
            .any(|r| r.from == relation.from && r.to == relation.to && r.kind == relation.kind)
        {
            graph.relations.push(relation);
        }
        Ok(())
    }

    async fn find_chunks_for_term(&self, doc_id: &str, term: &str) -> Result<Vec<i64>> {
        let docs = self.docs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(graph) = docs.get(doc_id) else {
            return Ok(Vec::new());
        };
        let needle = term.to_lowercase();
        let mut chunk_ids: Vec<i64> = graph
            .entities
            .values()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .flat_map(|e| e.chunk_ids.clone())
            .collect();
        chunk_ids.sort_unstable();
        chunk_ids.dedup();
        Ok(chunk_ids)
    }

    async fn get_graph(&self, doc_id: &str) -> Result<(Vec<GraphEntity>, Vec<GraphRelation>)> {
        let docs = self.docs.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(graph) = docs.get(doc_id) else {
            return Ok((Vec::new(), Vec::new()));
        };
        Ok((graph.entities.values().cloned().collect(), graph.relations.clone()))
    }
}
