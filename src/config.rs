//! Layered configuration: compiled-in defaults, an optional settings file,
//! and CLI overrides, validated once at startup.
//!
//! Resolution order (lowest to highest precedence): `Settings::default()` ->
//! an optional JSON settings file -> explicit CLI flag overrides. This
//! mirrors the teacher's `PromptSet::default_dir()` lookup order: an
//! explicit path always wins, then an environment variable, then a
//! `dirs`-resolved config directory, then the compiled-in default.

use crate::error::{ConfigError, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Dense retrieval backend selection for base (non-hybrid) mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// Exact brute-force cosine scan.
    BruteForce,
    /// Approximate `usearch` HNSW index (requires the `usearch-hnsw` feature).
    Hnsw,
}

/// Retrieval mode: single-backend or fused hybrid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// Single chosen backend (still query-variant expanded and RRF-fused
    /// across variants).
    Base,
    /// Vector and BM25 backends fused via Reciprocal Rank Fusion.
    Hybrid,
}

/// The fully-resolved, validated configuration record backing every
/// behavior-affecting knob named in `SPEC_FULL.md` ?6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Which dense retriever to use in base mode.
    pub vector_backend: VectorBackend,
    /// Final result count for retrieval.
    pub top_k: usize,
    /// `base` or `hybrid`.
    pub retrieval_mode: RetrievalMode,
    /// Enable deterministic query-variant expansion.
    pub query_fusion: bool,
    /// RRF constant; must be > 0.
    pub rrf_k0: f64,
    /// Per-variant candidate depth factor.
    pub candidate_multiplier: usize,
    /// Enable lexical rerank after fusion.
    pub enable_rerank: bool,
    /// Pool size considered for rerank.
    pub rerank_pool: usize,
    /// Minimum accepted evidence hits before an answer is attempted.
    pub min_evidence_hits: usize,
    /// Maximum number of evidence chunks admitted into the prompt.
    pub max_context_chunks: usize,
    /// Maximum cumulative evidence character budget.
    pub max_context_chars: usize,
    /// Neighbor expansion window (in `vector_id` distance).
    pub neighbor_window: usize,
    /// Whether to expand evidence with same-document neighbors.
    pub include_neighbors: bool,
    /// Generator sampling temperature; 0 recommended for determinism.
    pub llm_temperature: f64,
    /// Maximum agent-loop node transitions.
    pub agent_max_steps: u32,
    /// Maximum agent-loop retrieval invocations.
    pub agent_max_tool_calls: u32,
    /// Maximum agent-loop retrieve->assess cycles.
    pub agent_max_retrieval_rounds: u32,
    /// Target chunk size in characters.
    pub chunk_target_chars: usize,
    /// Maximum chunk size in characters.
    pub chunk_max_chars: usize,
    /// Minimum chunk size in characters (below this, blocks keep packing).
    pub chunk_min_chars: usize,
    /// Number of trailing blocks carried forward as overlap.
    pub chunk_overlap_blocks: usize,
    /// Number of leading/trailing lines inspected per page for boilerplate.
    pub boilerplate_header_footer_lines: usize,
    /// Fraction of pages a line must repeat on to be boilerplate.
    pub boilerplate_ratio: f64,
    /// Identifies the embedder used to build/query the store.
    pub embedder_model_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vector_backend: VectorBackend::BruteForce,
            top_k: 10,
            retrieval_mode: RetrievalMode::Hybrid,
            query_fusion: true,
            rrf_k0: 60.0,
            candidate_multiplier: 4,
            enable_rerank: true,
            rerank_pool: 50,
            min_evidence_hits: 2,
            max_context_chunks: 8,
            max_context_chars: 12_000,
            neighbor_window: 1,
            include_neighbors: true,
            llm_temperature: 0.0,
            agent_max_steps: 8,
            agent_max_tool_calls: 4,
            agent_max_retrieval_rounds: 3,
            chunk_target_chars: 1400,
            chunk_max_chars: 2800,
            chunk_min_chars: 200,
            chunk_overlap_blocks: 1,
            boilerplate_header_footer_lines: 3,
            boilerplate_ratio: 0.6,
            embedder_model_name: "all-MiniLM-L6-v2".to_string(),
        }
    }
}

impl Settings {
    /// Loads settings by layering an optional settings file over the
    /// compiled-in default. `explicit_path` takes precedence over the
    /// `DOCRAG_CONFIG` environment variable and the `dirs`-resolved config
    /// directory (`~/.config/docrag/settings.json`).
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(path) = Self::resolve_path(explicit_path) {
            if path.exists() {
                let contents = std::fs::read_to_string(&path)?;
                settings = serde_json::from_str(&contents).map_err(|e| {
                    Error::Config(ConfigError::ParseFailed {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })
                })?;
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    fn resolve_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit_path {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("DOCRAG_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("docrag").join("settings.json"))
    }

    /// Validates every behavior-affecting knob, failing with
    /// `Error::Config` (exit code 2) before any index is touched.
    pub fn validate(&self) -> Result<()> {
        if self.rrf_k0 <= 0.0 {
            return Err(ConfigError::NonPositive {
                key: "rrf_k0".to_string(),
                value: self.rrf_k0,
            }
            .into());
        }
        if self.min_evidence_hits == 0 {
            return Err(ConfigError::NonPositive {
                key: "min_evidence_hits".to_string(),
                value: 0.0,
            }
            .into());
        }
        if self.chunk_overlap_blocks > 0 && self.chunk_min_chars >= self.chunk_max_chars {
            return Err(ConfigError::NonPositive {
                key: "chunk_min_chars".to_string(),
                value: self.chunk_min_chars as f64,
            }
            .into());
        }
        Ok(())
    }
}
