//! Semantic deduplication pass (§4.B step 7): removes near-duplicate
//! chunks whose pairwise cosine similarity exceeds a threshold, keeping
//! the higher-quality representative.

use crate::core::Chunk;
use crate::embedding::cosine_similarity;

/// Removes near-duplicates from `chunks` in place, returning the
/// deduplicated vector. Chunks without an embedding are never
/// considered duplicates of anything (there is nothing to compare).
/// When two chunks exceed `threshold`, the one with the lower
/// `quality_score` is dropped; ties keep the earlier (lower `index`)
/// chunk.
#[must_use]
pub fn dedup_chunks(chunks: Vec<Chunk>, threshold: f32) -> Vec<Chunk> {
    if chunks.len() < 2 {
        return chunks;
    }

    let mut keep = vec![true; chunks.len()];
    for i in 0..chunks.len() {
        if !keep[i] {
            continue;
        }
        let Some(emb_i) = &chunks[i].embedding else {
            continue;
        };
        for j in (i + 1)..chunks.len() {
            if !keep[j] {
                continue;
            }
            let Some(emb_j) = &chunks[j].embedding else {
                continue;
            };
            if cosine_similarity(emb_i, emb_j) > threshold {
                if chunks[i].quality_score >= chunks[j].quality_score {
                    keep[j] = false;
                } else {
                    keep[i] = false;
                    break;
                }
            }
        }
    }

    chunks
        .into_iter()
        .zip(keep)
        .filter_map(|(chunk, k)| k.then_some(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ChunkBuilder;

    fn chunk_with(text: &str, embedding: Vec<f32>, quality: f32, index: usize) -> Chunk {
        let mut c = ChunkBuilder::new()
            .doc_id("d1")
            .text(text)
            .index(index)
            .quality_score(quality)
            .build();
        c.embedding = Some(embedding);
        c
    }

    #[test]
    fn fewer_than_two_chunks_is_unchanged() {
        let chunks = vec![chunk_with("a", vec![1.0, 0.0], 0.5, 0)];
        assert_eq!(dedup_chunks(chunks.clone(), 0.9).len(), 1);
    }

    #[test]
    fn near_duplicates_drop_the_lower_quality_one() {
        let chunks = vec![
            chunk_with("a", vec![1.0, 0.0], 0.9, 0),
            chunk_with("a-near-dup", vec![0.99, 0.01], 0.3, 1),
        ];
        let result = dedup_chunks(chunks, 0.9);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text, "a");
    }

    #[test]
    fn dissimilar_chunks_are_both_kept() {
        let chunks = vec![
            chunk_with("a", vec![1.0, 0.0], 0.9, 0),
            chunk_with("b", vec![0.0, 1.0], 0.9, 1),
        ];
        assert_eq!(dedup_chunks(chunks, 0.9).len(), 2);
    }

    #[test]
    fn chunks_without_embeddings_are_never_dropped() {
        let mut c1 = ChunkBuilder::new().doc_id("d1").text("a").build();
        c1.embedding = None;
        let mut c2 = ChunkBuilder::new().doc_id("d1").text("a").build();
        c2.embedding = None;
        assert_eq!(dedup_chunks(vec![c1, c2], 0.0).len(), 2);
    }
}
