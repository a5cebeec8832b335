//! Vector retriever (C4): ANN search over normalized embeddings with
//! per-page de-duplication.
//!
//! Grounded on the teacher's `search::hnsw::HnswIndex` for the HNSW backend
//! (same usearch wrapping, same save/load `.map` sidecar convention) and
//! `embedding::cosine_similarity` for the always-available brute-force
//! backend.

#[cfg(feature = "usearch-hnsw")]
mod hnsw;

#[cfg(feature = "usearch-hnsw")]
pub use hnsw::{HnswConfig, HnswVectorIndex};

use crate::core::{ChunkHit, NegOrd};
use crate::embedding::cosine_similarity;
use crate::store::LoadedStore;
use std::collections::HashMap;

/// A vector search backend: given a query embedding, returns ranked
/// `(vector_id, score)` candidates.
pub trait VectorIndex: Send + Sync {
    /// Returns up to `k` nearest candidates to `query`, highest score first.
    fn search_candidates(&self, query: &[f32], k: usize) -> Vec<(usize, f32)>;
}

/// Always-available exact cosine brute-force backend.
pub struct BruteForceIndex<'a> {
    store: &'a LoadedStore,
}

impl<'a> BruteForceIndex<'a> {
    #[must_use]
    pub const fn new(store: &'a LoadedStore) -> Self {
        Self { store }
    }
}

impl VectorIndex for BruteForceIndex<'_> {
    fn search_candidates(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 {
            return Vec::new();
        }
        let mut scored: Vec<(usize, f32)> = (0..self.store.len())
            .filter_map(|i| {
                let vector = self.store.vector(i)?;
                Some((i, cosine_similarity(query, &vector)))
            })
            .collect();
        scored.sort_by_key(|&(vector_id, score)| (NegOrd(f64::from(score)), vector_id));
        scored.truncate(k);
        scored
    }
}

/// Runs vector search over `index`, then deduplicates candidates by
/// `(doc_id, start_page, end_page)` keeping at most `max_hits_per_page`
/// per key while iterating in descending score order, stopping once `k`
/// hits are kept. Ties broken by ascending `(doc_id, start_page, chunk_id)`.
#[must_use]
pub fn vector_search(
    index: &dyn VectorIndex,
    store: &LoadedStore,
    query_embedding: &[f32],
    k: usize,
    candidates_k: usize,
    max_hits_per_page: usize,
) -> Vec<ChunkHit> {
    if k == 0 {
        return Vec::new();
    }
    let requested = candidates_k.max(k);
    let candidates = index.search_candidates(query_embedding, requested);

    let mut per_page_count: HashMap<(String, u32, u32), usize> = HashMap::new();
    let mut hits = Vec::new();

    for (vector_id, score) in candidates {
        let Some(row) = store.rows.get(vector_id) else { continue };
        let page_key = (row.doc_id.clone(), row.start_page, row.end_page);
        let count = per_page_count.entry(page_key).or_insert(0);
        if *count >= max_hits_per_page.max(1) {
            continue;
        }
        *count += 1;

        hits.push(ChunkHit {
            score: f64::from(score),
            chunk_id: row.chunk_id.clone(),
            doc_id: row.doc_id.clone(),
            start_page: row.start_page,
            end_page: row.end_page,
            text: row.text.clone(),
        });
        if hits.len() >= k {
            break;
        }
    }

    hits.sort_by_key(crate::core::ChunkHit::evidence_sort_key);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{build_store, persist_store};
    use crate::core::Chunk;
    use crate::embedding::{Embedder, FallbackEmbedder};

    fn setup_store() -> (tempfile::TempDir, LoadedStore) {
        let chunks = vec![
            Chunk::new("d::p0001::c000".to_string(), "d".to_string(), 1, 1, "alpha beta gamma".to_string()),
            Chunk::new("d::p0002::c000".to_string(), "d".to_string(), 2, 2, "delta epsilon zeta".to_string()),
        ];
        let (texts, rows) = build_store(&chunks);
        let embedder = FallbackEmbedder::new(16);
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&refs).expect("embed");
        let dir = tempfile::tempdir().expect("tempdir");
        persist_store(dir.path(), &rows, &vectors, "test").expect("persist");
        let store = LoadedStore::load(dir.path()).expect("load");
        (dir, store)
    }

    #[test]
    fn brute_force_returns_self_as_top_match() {
        let (_dir, store) = setup_store();
        let index = BruteForceIndex::new(&store);
        let query = store.vector(0).expect("vector");
        let candidates = index.search_candidates(&query, 2);
        assert_eq!(candidates[0].0, 0);
    }

    #[test]
    fn vector_search_respects_k() {
        let (_dir, store) = setup_store();
        let index = BruteForceIndex::new(&store);
        let query = store.vector(0).expect("vector");
        let hits = vector_search(&index, &store, &query, 1, 4, 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn zero_k_returns_no_hits() {
        let (_dir, store) = setup_store();
        let index = BruteForceIndex::new(&store);
        let query = store.vector(0).expect("vector");
        assert!(vector_search(&index, &store, &query, 0, 4, 1).is_empty());
    }

    #[test]
    fn max_hits_per_page_caps_duplicates_from_same_page() {
        let (_dir, store) = setup_store();
        let index = BruteForceIndex::new(&store);
        let query = store.vector(0).expect("vector");
        let hits = vector_search(&index, &store, &query, 10, 10, 1);
        let mut seen = std::collections::HashSet::new();
        for hit in &hits {
            let key = (hit.doc_id.clone(), hit.start_page, hit.end_page);
            assert!(seen.insert(key), "duplicate page beyond max_hits_per_page");
        }
    }
}
