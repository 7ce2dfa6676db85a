//! The Hybrid Retriever (§4.E): fuses vector, keyword, and graph
//! search over a project's documents into one ranked, citable list.
//!
//! Generalizes the teacher's `search::hybrid_search` (semantic + BM25
//! fused with `reciprocal_rank_fusion`) by adding a graph leg and
//! replacing unweighted RRF with weighted min-max fusion; `rrf` is
//! kept as an alternate fusion strategy behind [`RetrieveOptions`].
//! Weight renormalization on source failure mirrors the sibling
//! repo's `Orchestrator::search_with_fallback` degrade-and-continue
//! pattern (hybrid → bm25 → semantic).

mod rrf;

pub use rrf::{reciprocal_rank_fusion, weighted_rrf, RrfConfig};

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result, StoreError};
use crate::gateway::Gateway;
use crate::store::{GraphStore, RelationalStore, VectorStore};

/// Default number of results returned after reranking/truncation.
pub const DEFAULT_TOP_K_FINAL: usize = 20;

/// Default size of the fused intermediate list before truncation.
pub const DEFAULT_TOP_K_INTERMEDIATE: usize = 50;

/// Default fusion weight for the vector leg.
pub const DEFAULT_WEIGHT_VECTOR: f64 = 0.4;

/// Default fusion weight for the keyword (BM25) leg.
pub const DEFAULT_WEIGHT_KEYWORD: f64 = 0.35;

/// Default fusion weight for the graph leg.
pub const DEFAULT_WEIGHT_GRAPH: f64 = 0.25;

/// Which leg of the retriever a [`RetrievedChunk`] came from, attached
/// for citation per §4.E step 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalSource {
    /// Surfaced only by vector similarity search.
    Vector,
    /// Surfaced only by keyword (BM25) search.
    Keyword,
    /// Surfaced only by graph expansion.
    Graph,
    /// Surfaced by two or more legs and combined.
    Fused,
}

impl RetrievalSource {
    /// Tie-break priority used when fused scores are equal: vector
    /// outranks keyword outranks graph (§4.E step 3).
    const fn priority(self) -> u8 {
        match self {
            Self::Fused => 0,
            Self::Vector => 1,
            Self::Keyword => 2,
            Self::Graph => 3,
        }
    }
}

/// One fused, citable retrieval hit.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Owning document id.
    pub doc_id: String,
    /// Chunk id within that document.
    pub chunk_id: i64,
    /// The chunk's text, included so the QA Orchestrator need not
    /// re-fetch it.
    pub text: String,
    /// Fused score in `[0, 1]` (before rerank).
    pub score: f64,
    /// Which leg(s) produced this hit.
    pub source: RetrievalSource,
}

/// Tunable knobs for one [`HybridRetriever::retrieve`] call.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveOptions {
    /// Results returned after truncation.
    pub top_k_final: usize,
    /// Fused candidates kept before optional rerank/truncation.
    pub top_k_intermediate: usize,
    /// Fusion weight for vector search.
    pub weight_vector: f64,
    /// Fusion weight for keyword search.
    pub weight_keyword: f64,
    /// Fusion weight for graph search.
    pub weight_graph: f64,
    /// Whether to rerank the intermediate list via the Gateway.
    pub rerank: bool,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            top_k_final: DEFAULT_TOP_K_FINAL,
            top_k_intermediate: DEFAULT_TOP_K_INTERMEDIATE,
            weight_vector: DEFAULT_WEIGHT_VECTOR,
            weight_keyword: DEFAULT_WEIGHT_KEYWORD,
            weight_graph: DEFAULT_WEIGHT_GRAPH,
            rerank: false,
        }
    }
}

impl RetrieveOptions {
    /// Creates options with default weights, overriding `top_k_final`.
    #[must_use]
    pub fn with_top_k(top_k_final: usize) -> Self {
        Self {
            top_k_final,
            ..Self::default()
        }
    }
}

/// One leg's raw, unnormalized hits, keyed by `(doc_id, chunk_id)`.
type RawHits = HashMap<(String, i64), f64>;

/// Fuses vector, keyword, and graph search over a project's documents.
///
/// Holds shared handles to the capability ports it orchestrates.
pub struct HybridRetriever {
    relational: Arc<dyn RelationalStore>,
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    gateway: Arc<dyn Gateway>,
}

impl HybridRetriever {
    /// Creates a retriever over the given capability ports.
    #[must_use]
    pub fn new(
        relational: Arc<dyn RelationalStore>,
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        gateway: Arc<dyn Gateway>,
    ) -> Self {
        Self {
            relational,
            vector,
            graph,
            gateway,
        }
    }

    /// Retrieves the fused, ranked top-k chunks for `query` across all
    /// documents in `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AllSourcesFailed`] (wrapped in
    /// `Error::StoreUnavailable`) if vector, keyword, and graph search
    /// all fail; otherwise degrades by redistributing the failed
    /// source's weight among the survivors.
    pub async fn retrieve(
        &self,
        query: &str,
        project_id: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<RetrievedChunk>> {
        let documents = self.relational.documents_for_project(project_id)?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let terms = query_terms(query);
        let query_embedding = self.gateway.embed(&[query.to_string()]).await;

        let (vector_hits, vector_ok) = self.collect_vector_hits(&documents, query_embedding, options.top_k_intermediate).await;
        let (keyword_hits, keyword_ok) = self.collect_keyword_hits(&documents, query, options.top_k_intermediate);
        let (graph_hits, graph_ok) = self.collect_graph_hits(&documents, &terms).await;

        if !vector_ok && !keyword_ok && !graph_ok {
            return Err(Error::from(StoreError::AllSourcesFailed));
        }

        let weights = renormalize_weights([
            (vector_ok, options.weight_vector),
            (keyword_ok, options.weight_keyword),
            (graph_ok, options.weight_graph),
        ]);

        let fused = fuse(&vector_hits, &keyword_hits, &graph_hits, weights);

        let mut results = Vec::with_capacity(fused.len().min(options.top_k_intermediate));
        for ((doc_id, chunk_id), (score, source)) in fused {
            if results.len() >= options.top_k_intermediate {
                break;
            }
            if let Ok(Some(chunk)) = self.relational.get_chunk(chunk_id) {
                results.push(RetrievedChunk {
                    doc_id,
                    chunk_id,
                    text: chunk.text,
                    score,
                    source,
                });
            }
        }

        if options.rerank {
            self.rerank(query, &mut results).await;
        }

        results.truncate(options.top_k_final);
        Ok(results)
    }

    async fn collect_vector_hits(
        &self,
        documents: &[crate::core::Document],
        query_embedding: Result<Vec<Vec<f32>>>,
        top_k: usize,
    ) -> (RawHits, bool) {
        let Ok(embeddings) = query_embedding else {
            return (RawHits::new(), false);
        };
        let Some(vector) = embeddings.into_iter().next() else {
            return (RawHits::new(), false);
        };

        let mut hits = RawHits::new();
        let mut any_error = false;
        for doc in documents {
            match self.vector.search(&doc.doc_id, &vector, top_k).await {
                Ok(doc_hits) => {
                    for hit in doc_hits {
                        if let Ok(chunk_id) = hit.id.parse::<i64>() {
                            hits.insert((doc.doc_id.clone(), chunk_id), f64::from(hit.score));
                        }
                    }
                }
                Err(_) => any_error = true,
            }
        }
        // A partial failure (some documents unreachable) still counts as a
        // usable source as long as at least one document answered.
        let ok = !(any_error && hits.is_empty());
        (hits, ok)
    }

    fn collect_keyword_hits(&self, documents: &[crate::core::Document], query: &str, top_k: usize) -> (RawHits, bool) {
        let mut hits = RawHits::new();
        let mut any_error = false;
        for doc in documents {
            match self.relational.search_chunks_fts(&doc.doc_id, query, top_k) {
                Ok(doc_hits) => {
                    for (chunk_id, score) in doc_hits {
                        hits.insert((doc.doc_id.clone(), chunk_id), score);
                    }
                }
                Err(_) => any_error = true,
            }
        }
        let ok = !(any_error && hits.is_empty());
        (hits, ok)
    }

    async fn collect_graph_hits(&self, documents: &[crate::core::Document], terms: &[String]) -> (RawHits, bool) {
        if terms.is_empty() {
            return (RawHits::new(), true);
        }
        let mut hits = RawHits::new();
        let mut any_error = false;
        for doc in documents {
            for term in terms {
                match self.graph.find_chunks_for_term(&doc.doc_id, term).await {
                    Ok(chunk_ids) => {
                        for chunk_id in chunk_ids {
                            // Each matching term adds one vote; min-max
                            // normalization later turns vote counts into [0, 1].
                            *hits.entry((doc.doc_id.clone(), chunk_id)).or_insert(0.0) += 1.0;
                        }
                    }
                    Err(_) => any_error = true,
                }
            }
        }
        let ok = !(any_error && hits.is_empty());
        (hits, ok)
    }

    /// Best-effort LLM rerank: asks the gateway to order chunk ids by
    /// relevance and re-scores in that order. Falls back silently to
    /// the fused order if the completion does not parse.
    async fn rerank(&self, query: &str, results: &mut [RetrievedChunk]) {
        if results.len() < 2 {
            return;
        }
        let listing: String = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{i}] {}", r.text.chars().take(200).collect::<String>()))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Query: {query}\n\nRank the following passages by relevance to the query, most relevant first. \
             Respond with a JSON array of the bracketed indices only, e.g. [2,0,1].\n\n{listing}"
        );
        let request = crate::gateway::CompletionRequest::new(prompt);
        let Ok((text, _usage)) = self.gateway.complete(&request).await else {
            return;
        };
        let Some(order) = parse_rerank_order(&text, results.len()) else {
            return;
        };

        let original: Vec<RetrievedChunk> = results.to_vec();
        for (slot, &idx) in results.iter_mut().zip(order.iter()) {
            *slot = original[idx].clone();
        }
    }
}

fn parse_rerank_order(text: &str, len: usize) -> Option<Vec<usize>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    let order: Vec<usize> = serde_json::from_str(&text[start..=end]).ok()?;
    let mut seen = vec![false; len];
    for &idx in &order {
        if idx >= len || seen[idx] {
            return None;
        }
        seen[idx] = true;
    }
    if order.len() == len {
        Some(order)
    } else {
        None
    }
}

fn query_terms(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| t.len() > 2)
        .collect()
}

/// Redistributes the weight of any failed source proportionally among
/// the survivors (§4.E degrade behavior).
fn renormalize_weights(sources: [(bool, f64); 3]) -> [f64; 3] {
    let surviving_total: f64 = sources.iter().filter(|(ok, _)| *ok).map(|(_, w)| w).sum();
    if surviving_total <= 0.0 {
        return [0.0, 0.0, 0.0];
    }
    sources.map(|(ok, w)| if ok { w / surviving_total } else { 0.0 })
}

/// Min-max normalizes `hits`' scores to `[0, 1]`. An empty or
/// single-valued set normalizes to all-zeros (no signal to rank on).
fn min_max_normalize(hits: &RawHits) -> HashMap<(String, i64), f64> {
    if hits.is_empty() {
        return HashMap::new();
    }
    let min = hits.values().copied().fold(f64::INFINITY, f64::min);
    let max = hits.values().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    hits.iter()
        .map(|(k, &v)| (k.clone(), if span > 0.0 { (v - min) / span } else { 0.0 }))
        .collect()
}

fn fuse(
    vector_hits: &RawHits,
    keyword_hits: &RawHits,
    graph_hits: &RawHits,
    weights: [f64; 3],
) -> Vec<((String, i64), (f64, RetrievalSource))> {
    let [w_vector, w_keyword, w_graph] = weights;
    let vector_norm = min_max_normalize(vector_hits);
    let keyword_norm = min_max_normalize(keyword_hits);
    let graph_norm = min_max_normalize(graph_hits);

    let mut fused: HashMap<(String, i64), (f64, u8)> = HashMap::new();
    for (key, score) in &vector_norm {
        let entry = fused.entry(key.clone()).or_insert((0.0, 0));
        entry.0 += score * w_vector;
        entry.1 |= 0b001;
    }
    for (key, score) in &keyword_norm {
        let entry = fused.entry(key.clone()).or_insert((0.0, 0));
        entry.0 += score * w_keyword;
        entry.1 |= 0b010;
    }
    for (key, score) in &graph_norm {
        let entry = fused.entry(key.clone()).or_insert((0.0, 0));
        entry.0 += score * w_graph;
        entry.1 |= 0b100;
    }

    let mut ranked: Vec<((String, i64), (f64, RetrievalSource))> = fused
        .into_iter()
        .map(|(key, (score, mask))| {
            let source = match mask {
                0b001 => RetrievalSource::Vector,
                0b010 => RetrievalSource::Keyword,
                0b100 => RetrievalSource::Graph,
                _ => RetrievalSource::Fused,
            };
            (key, (score, source))
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.1 .0
            .partial_cmp(&a.1 .0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1 .1.priority().cmp(&b.1 .1.priority()))
    });
    ranked
}

impl Clone for RetrievedChunk {
    fn clone(&self) -> Self {
        Self {
            doc_id: self.doc_id.clone(),
            chunk_id: self.chunk_id,
            text: self.text.clone(),
            score: self.score,
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkBuilder, Document};
    use crate::gateway::MockGateway;
    use crate::store::sqlite::SqliteRelationalStore;
    use crate::store::{MockGraphStore, MockVectorStore};

    fn setup() -> (HybridRetriever, Arc<SqliteRelationalStore>) {
        let relational = Arc::new(SqliteRelationalStore::in_memory().unwrap());
        relational.init().unwrap();
        let vector = Arc::new(MockVectorStore::new());
        let graph = Arc::new(MockGraphStore::new());
        let gateway = Arc::new(MockGateway::default());
        let retriever = HybridRetriever::new(relational.clone(), vector, graph, gateway);
        (retriever, relational)
    }

    #[tokio::test]
    async fn empty_project_yields_empty_results() {
        let (retriever, _store) = setup();
        let results = retriever.retrieve("anything", "proj-missing", &RetrieveOptions::default()).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn keyword_only_project_returns_keyword_hits() {
        let (retriever, store) = setup();
        let doc = Document::new("d1", "f.txt", "text/plain", b"hi".to_vec(), "u1", "p1", 0);
        store.insert_document(&doc).unwrap();
        store
            .replace_chunks(
                "d1",
                &[ChunkBuilder::new().doc_id("d1").text("rust programming language basics").range(0..35).index(0).build()],
            )
            .unwrap();

        let results = retriever.retrieve("rust programming", "p1", &RetrieveOptions::default()).await.unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0].doc_id, "d1");
    }

    #[test]
    fn renormalize_redistributes_failed_weight() {
        let weights = renormalize_weights([(true, 0.4), (false, 0.35), (true, 0.25)]);
        assert!((weights[0] + weights[2] - 1.0).abs() < 1e-9);
        assert_eq!(weights[1], 0.0);
    }

    #[test]
    fn renormalize_all_failed_yields_zero_weights() {
        let weights = renormalize_weights([(false, 0.4), (false, 0.35), (false, 0.25)]);
        assert_eq!(weights, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn min_max_normalize_handles_uniform_scores() {
        let mut hits = RawHits::new();
        hits.insert(("d1".to_string(), 1), 5.0);
        hits.insert(("d1".to_string(), 2), 5.0);
        let normalized = min_max_normalize(&hits);
        assert!(normalized.values().all(|&v| v.abs() < f64::EPSILON));
    }

    #[test]
    fn fuse_tags_overlap_as_fused() {
        let mut vector_hits = RawHits::new();
        vector_hits.insert(("d1".to_string(), 1), 1.0);
        let mut keyword_hits = RawHits::new();
        keyword_hits.insert(("d1".to_string(), 1), 1.0);
        let graph_hits = RawHits::new();

        let fused = fuse(&vector_hits, &keyword_hits, &graph_hits, [0.5, 0.5, 0.0]);
        assert_eq!(fused[0].1 .1, RetrievalSource::Fused);
    }

    #[test]
    fn parse_rerank_order_rejects_partial_permutations() {
        assert!(parse_rerank_order("[0,1]", 3).is_none());
        assert_eq!(parse_rerank_order("some text [1,0,2] trailing", 3), Some(vec![1, 0, 2]));
    }

    #[test]
    fn query_terms_drops_short_and_punctuation_only_tokens() {
        let terms = query_terms("The CLI tool? yes!!");
        assert_eq!(terms, vec!["the".to_string(), "cli".to_string(), "tool".to_string()]);
    }
}
