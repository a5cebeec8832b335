//! Transient retrieval and answer records.

use serde::{Deserialize, Serialize};

/// A transient retrieval result: a scored reference to a chunk.
///
/// `ChunkHit` is never persisted; it is produced by the vector/BM25/fusion
/// retrievers and consumed by the citation enforcer and agent loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    /// Backend- or fusion-specific score. Higher is better.
    pub score: f64,
    /// The chunk this hit refers to.
    pub chunk_id: String,
    /// Owning document identifier.
    pub doc_id: String,
    /// Start page (inclusive).
    pub start_page: u32,
    /// End page (inclusive).
    pub end_page: u32,
    /// Chunk text, carried along so downstream stages need not re-fetch it.
    pub text: String,
}

impl ChunkHit {
    /// The ascending tie-break key used throughout retrieval and fusion:
    /// `(doc_id, start_page, chunk_id)`.
    #[must_use]
    pub fn tie_break_key(&self) -> (String, u32, String) {
        (self.doc_id.clone(), self.start_page, self.chunk_id.clone())
    }

    /// The full deterministic sort key used for evidence selection:
    /// `(-score, doc_id, start_page, end_page, chunk_id)`, expressed so that
    /// ascending order on the returned tuple matches the spec's descending-
    /// score, ascending-tie-break ordering.
    #[must_use]
    pub fn evidence_sort_key(&self) -> (NegOrd, String, u32, u32, String) {
        (
            NegOrd(self.score),
            self.doc_id.clone(),
            self.start_page,
            self.end_page,
            self.chunk_id.clone(),
        )
    }
}

/// Wraps an `f64` score so that ascending-order comparison yields
/// descending score order, letting score-first composite keys be expressed
/// as a single ascending sort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegOrd(pub f64);

impl Eq for NegOrd {}

impl PartialOrd for NegOrd {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NegOrd {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Descending on the wrapped value: larger scores sort first.
        other.0.partial_cmp(&self.0).unwrap_or(std::cmp::Ordering::Equal)
    }
}

/// A citation attached to an accepted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Assigned key, `"c<N>"` with `N >= 1`.
    pub key: String,
    /// Owning document identifier.
    pub doc_id: String,
    /// Start page (inclusive).
    pub start_page: u32,
    /// End page (inclusive).
    pub end_page: u32,
    /// The chunk this citation grounds.
    pub chunk_id: String,
}

/// The canonical refusal string, emitted in lowercase and detected
/// case-insensitively.
pub const CANONICAL_REFUSAL: &str = "not found in provided docs";

/// The final result of the citation enforcement pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    /// Answer text. Equals `CANONICAL_REFUSAL` iff `is_refusal`.
    pub answer_text: String,
    /// Citations backing the answer; empty iff `is_refusal`.
    pub citations: Vec<Citation>,
    /// Whether this result is a refusal.
    pub is_refusal: bool,
}

impl AnswerResult {
    /// Builds the canonical refusal result.
    #[must_use]
    pub fn refusal() -> Self {
        Self {
            answer_text: CANONICAL_REFUSAL.to_string(),
            citations: Vec::new(),
            is_refusal: true,
        }
    }

    /// Builds an accepted, cited answer.
    #[must_use]
    pub const fn accepted(answer_text: String, citations: Vec<Citation>) -> Self {
        Self {
            answer_text,
            citations,
            is_refusal: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(score: f64, doc: &str, page: u32, chunk: &str) -> ChunkHit {
        ChunkHit {
            score,
            chunk_id: chunk.to_string(),
            doc_id: doc.to_string(),
            start_page: page,
            end_page: page,
            text: String::new(),
        }
    }

    #[test]
    fn evidence_sort_key_orders_by_descending_score() {
        let mut hits = vec![hit(1.0, "a", 1, "x"), hit(2.0, "a", 1, "y")];
        hits.sort_by_key(ChunkHit::evidence_sort_key);
        assert_eq!(hits[0].chunk_id, "y");
    }

    #[test]
    fn evidence_sort_key_tie_breaks_ascending_on_equal_score() {
        let mut hits = vec![hit(1.0, "b", 1, "z"), hit(1.0, "a", 1, "y")];
        hits.sort_by_key(ChunkHit::evidence_sort_key);
        assert_eq!(hits[0].doc_id, "a");
    }

    #[test]
    fn refusal_has_empty_citations() {
        let result = AnswerResult::refusal();
        assert!(result.is_refusal);
        assert!(result.citations.is_empty());
        assert_eq!(result.answer_text, CANONICAL_REFUSAL);
    }
}
