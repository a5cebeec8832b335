//! # docrag-rs
//!
//! A citation-grounded retrieval engine for technical document corpora.
//!
//! docrag-rs ingests cleaned page text into content-aware chunks, indexes
//! them for both dense (embedding) and lexical (BM25) retrieval, fuses the
//! two via Reciprocal Rank Fusion, and answers questions only when every
//! sentence of the answer can be traced back to a retrieved chunk --
//! refusing otherwise.
//!
//! ## Features
//!
//! - **Content-aware chunking**: verbatim-preserving, per-page chunk
//!   boundaries.
//! - **Hybrid retrieval**: dense ANN search fused with BM25 via RRF, with
//!   deterministic query-variant expansion and optional lexical rerank.
//! - **Citation enforcement**: every accepted sentence must carry a
//!   recognized citation key, or the answer is refused.
//! - **Bounded agent loop**: retrieve-assess-refine-answer with explicit
//!   step/tool/round budgets and prioritized refusal reasons.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod agent;
pub mod bm25;
pub mod chunking;
pub mod citation;
pub mod clean;
pub mod cli;
pub mod config;
pub mod core;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod fusion;
pub mod generator;
pub mod ingest;
pub mod store;
pub mod vector;

// Re-export error types at crate root.
pub use error::{Error, Result};

// Re-export core domain types.
pub use core::{
    AgentCounters, AgentState, AnswerResult, Chunk, ChunkHit, Citation, Document, NegOrd, Page, Plan, PlanAction,
    RefusalReason, StopReason, CANONICAL_REFUSAL,
};

// Re-export configuration.
pub use config::{RetrievalMode, Settings, VectorBackend};

// Re-export chunking.
pub use chunking::chunk_pages;

// Re-export cleaning.
pub use clean::{clean_page_text, detect_boilerplate, CleanConfig};

// Re-export embedding.
#[cfg(feature = "fastembed-embeddings")]
pub use embedding::FastEmbedEmbedder;
pub use embedding::{cosine_similarity, create_embedder, l2_normalize, Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};

// Re-export the embedding store.
pub use store::{EmbeddingManifest, LoadedStore, StoreRow};

// Re-export BM25.
pub use bm25::{tokenize, Bm25Artifact, Bm25Doc, Bm25Params};

// Re-export vector retrieval.
#[cfg(feature = "usearch-hnsw")]
pub use vector::{HnswConfig, HnswVectorIndex};
pub use vector::{vector_search, BruteForceIndex, VectorIndex};

// Re-export fusion.
pub use fusion::{base_search, hybrid_search, query_variants, rerank_fused_hits, rrf_fuse};

// Re-export citation enforcement.
pub use citation::{build_cited_answer, build_context_and_citations, enforce_inline_citations, expand_with_neighbors, select_evidence};

// Re-export the agent loop.
pub use agent::{heuristic_route, run_agent};

// Re-export the generator abstraction.
pub use generator::{EchoGenerator, Generator};

// Re-export the ingest pipeline.
pub use ingest::{run_ingest, IngestReport};

// Re-export the evaluator.
pub use eval::{evaluate, EvalSummary, LabeledQuestion};

// Re-export CLI types.
pub use cli::{Cli, Commands, OutputFormat};
