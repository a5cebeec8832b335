//! BM25 lexical retriever (C5): inverted-index search with a tokenizer that
//! preserves compound technical tokens.
//!
//! Grounded almost 1:1 on `original_source/rag/index_bm25.py` (artifact
//! shape, tokenizer, idf formula) and `rag/retriever/bm25_retriever.py`
//! (scoring loop), restructured into the teacher's module-per-concern style.

use crate::core::{ChunkHit, NegOrd};
use crate::store::StoreRow;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+(?:[-._][a-z0-9]+)+|[a-z0-9]+").expect("valid regex"));
static COMPOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[-._][a-z0-9]+)+$").expect("valid regex"));

/// Tokenizes text while preserving technical compounds like `ML-KEM.KeyGen`.
/// Lowercases first, then extracts tokens; each compound token additionally
/// contributes its dash/dot/underscore-separated sub-parts, in encountered
/// order, duplicates kept (term frequency matters).
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let mut expanded = Vec::new();
    for mat in TOKEN_RE.find_iter(&lowered) {
        let token = mat.as_str();
        expanded.push(token.to_string());
        if COMPOUND_RE.is_match(token) {
            for part in token.split(['-', '.', '_']) {
                if !part.is_empty() {
                    expanded.push(part.to_string());
                }
            }
        }
    }
    expanded
}

/// BM25 scoring parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// One document record retained by the BM25 artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Doc {
    pub chunk_id: String,
    pub doc_id: String,
    pub start_page: u32,
    pub end_page: u32,
    pub text: String,
    pub vector_id: usize,
}

/// Fully serializable BM25 artifact matching the `?6` persistence contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Artifact {
    pub version: u32,
    pub tokenizer: String,
    pub params: Bm25Params,
    pub n_docs: usize,
    pub avgdl: f64,
    pub doc_lens: Vec<usize>,
    pub idf: HashMap<String, f64>,
    pub postings: HashMap<String, Vec<(usize, f64)>>,
    pub docs: Vec<Bm25Doc>,
}

impl Bm25Artifact {
    /// Builds an artifact from chunk-store rows, already sorted by
    /// `vector_id` (the invariant the chunk store maintains).
    #[must_use]
    pub fn build(rows: &[StoreRow], params: Bm25Params) -> Self {
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut postings: HashMap<String, Vec<(usize, f64)>> = HashMap::new();
        let mut doc_lens = Vec::with_capacity(rows.len());
        let mut docs = Vec::with_capacity(rows.len());

        for (doc_idx, row) in rows.iter().enumerate() {
            let tokens = tokenize(&row.text);
            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in &tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            doc_lens.push(tf.values().sum());
            docs.push(Bm25Doc {
                chunk_id: row.chunk_id.clone(),
                doc_id: row.doc_id.clone(),
                start_page: row.start_page,
                end_page: row.end_page,
                text: row.text.clone(),
                vector_id: row.vector_id,
            });

            for (term, freq) in &tf {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
                postings
                    .entry(term.clone())
                    .or_default()
                    .push((doc_idx, *freq as f64));
            }
        }

        let n_docs = docs.len();
        #[allow(clippy::cast_precision_loss)]
        let avgdl = if n_docs == 0 {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / n_docs as f64
        };

        let idf = doc_freq
            .iter()
            .map(|(term, df)| {
                #[allow(clippy::cast_precision_loss)]
                let value = ((n_docs as f64 - *df as f64 + 0.5) / (*df as f64 + 0.5) + 1.0).ln();
                (term.clone(), value)
            })
            .collect();

        Self {
            version: 1,
            tokenizer: "regex_compound_v1".to_string(),
            params,
            n_docs,
            avgdl,
            doc_lens,
            idf,
            postings,
            docs,
        }
    }

    /// Persists the artifact as `bm25.json` under `index_dir`.
    ///
    /// # Errors
    /// Returns `Error::Io` on write failure.
    pub fn save(&self, index_dir: &std::path::Path) -> crate::error::Result<()> {
        let path = index_dir.join("bm25.json");
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    /// Loads a previously persisted `bm25.json` artifact.
    ///
    /// # Errors
    /// Returns `Error::Artifact` if the file is missing or corrupt.
    pub fn load(index_dir: &std::path::Path) -> crate::error::Result<Self> {
        let path = index_dir.join("bm25.json");
        if !path.exists() {
            return Err(crate::error::Error::Artifact(crate::error::ArtifactError::NotBuilt {
                path: path.display().to_string(),
            }));
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| {
            crate::error::Error::Artifact(crate::error::ArtifactError::Corrupt { name: "bm25.json".to_string(), reason: e.to_string() })
        })
    }

    /// Searches for the top-`k` chunks by BM25 score. Ties broken by
    /// ascending `doc_idx`.
    #[must_use]
    pub fn search(&self, query: &str, k: usize) -> Vec<ChunkHit> {
        if k == 0 {
            return Vec::new();
        }
        let q_terms = tokenize(query);
        if q_terms.is_empty() {
            return Vec::new();
        }

        let mut qtf: HashMap<String, usize> = HashMap::new();
        for term in &q_terms {
            *qtf.entry(term.clone()).or_insert(0) += 1;
        }

        let mut scores: HashMap<usize, f64> = HashMap::new();
        for (term, q_weight) in &qtf {
            let Some(idf) = self.idf.get(term) else { continue };
            let Some(postings) = self.postings.get(term) else { continue };
            for &(doc_idx, tf) in postings {
                let dl = self.doc_lens.get(doc_idx).copied().unwrap_or(0);
                #[allow(clippy::cast_precision_loss)]
                let score = bm25_term_score(*idf, tf, dl as f64, self.avgdl, self.params) * (*q_weight as f64);
                *scores.entry(doc_idx).or_insert(0.0) += score;
            }
        }

        let mut ranked: Vec<(usize, f64)> = scores.into_iter().collect();
        ranked.sort_by_key(|&(doc_idx, score)| (NegOrd(score), doc_idx));
        ranked.truncate(k);

        ranked
            .into_iter()
            .filter_map(|(doc_idx, score)| {
                self.docs.get(doc_idx).map(|doc| ChunkHit {
                    score,
                    chunk_id: doc.chunk_id.clone(),
                    doc_id: doc.doc_id.clone(),
                    start_page: doc.start_page,
                    end_page: doc.end_page,
                    text: doc.text.clone(),
                })
            })
            .collect()
    }

    /// Scores arbitrary `text` against `query` using this artifact's idf and
    /// parameters, without needing the text to be an indexed document. Used
    /// by the fusion module's lexical rerank.
    #[must_use]
    pub fn score_text(&self, query: &str, text: &str) -> f64 {
        let q_terms = tokenize(query);
        if q_terms.is_empty() {
            return 0.0;
        }
        let doc_tokens = tokenize(text);
        let dl = doc_tokens.len();
        let mut tf: HashMap<String, usize> = HashMap::new();
        for token in &doc_tokens {
            *tf.entry(token.clone()).or_insert(0) += 1;
        }
        let mut qtf: HashMap<String, usize> = HashMap::new();
        for term in &q_terms {
            *qtf.entry(term.clone()).or_insert(0) += 1;
        }

        let mut total = 0.0;
        for (term, q_weight) in &qtf {
            let Some(idf) = self.idf.get(term) else { continue };
            let term_tf = tf.get(term).copied().unwrap_or(0);
            if term_tf == 0 {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let score =
                bm25_term_score(*idf, term_tf as f64, dl as f64, self.avgdl, self.params) * (*q_weight as f64);
            total += score;
        }
        total
    }
}

fn bm25_term_score(idf: f64, tf: f64, dl: f64, avgdl: f64, params: Bm25Params) -> f64 {
    let denom = tf + params.k1 * (1.0 - params.b + params.b * (dl / avgdl.max(1e-9)));
    idf * ((tf * (params.k1 + 1.0)) / denom.max(1e-9))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<StoreRow> {
        vec![
            StoreRow {
                vector_id: 0,
                chunk_id: "d::p0001::c000".to_string(),
                doc_id: "d".to_string(),
                start_page: 1,
                end_page: 1,
                text: "ML-KEM.KeyGen produces a key pair using SHAKE128.".to_string(),
            },
            StoreRow {
                vector_id: 1,
                chunk_id: "d::p0002::c000".to_string(),
                doc_id: "d".to_string(),
                start_page: 2,
                end_page: 2,
                text: "ML-DSA.Sign signs a message using a private key.".to_string(),
            },
        ]
    }

    #[test]
    fn tokenizer_preserves_compounds_and_expands_subparts() {
        let tokens = tokenize("ML-KEM.KeyGen SHAKE128");
        assert_eq!(
            tokens,
            vec!["ml-kem.keygen", "ml", "kem", "keygen", "shake128"]
        );
    }

    #[test]
    fn build_produces_expected_doc_count_and_avgdl() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        assert_eq!(artifact.n_docs, 2);
        assert!(artifact.avgdl > 0.0);
    }

    #[test]
    fn search_ranks_matching_doc_first() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        let hits = artifact.search("SHAKE128", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk_id, "d::p0001::c000");
    }

    #[test]
    fn empty_query_returns_no_hits() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        assert!(artifact.search("", 5).is_empty());
    }

    #[test]
    fn zero_k_returns_no_hits() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        assert!(artifact.search("SHAKE128", 0).is_empty());
    }

    #[test]
    fn score_text_is_positive_for_matching_text() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        let score = artifact.score_text("SHAKE128", "SHAKE128 is an extendable output function.");
        assert!(score > 0.0);
    }

    #[test]
    fn artifact_round_trips_through_json() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        let json = serde_json::to_string(&artifact).expect("serialize");
        let restored: Bm25Artifact = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored.n_docs, artifact.n_docs);
        assert_eq!(restored.docs.len(), artifact.docs.len());
    }

    #[test]
    fn save_and_load_round_trip_via_index_dir() {
        let artifact = Bm25Artifact::build(&rows(), Bm25Params::default());
        let dir = tempfile::tempdir().expect("tempdir");
        artifact.save(dir.path()).expect("save");
        let loaded = Bm25Artifact::load(dir.path()).expect("load");
        assert_eq!(loaded.n_docs, artifact.n_docs);
        assert_eq!(loaded.docs.len(), artifact.docs.len());
    }

    #[test]
    fn load_missing_artifact_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = Bm25Artifact::load(dir.path()).expect_err("should error");
        assert!(matches!(err, crate::error::Error::Artifact(crate::error::ArtifactError::NotBuilt { .. })));
    }
}
