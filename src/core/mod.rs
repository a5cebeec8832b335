//! Core domain models for docrag.
//!
//! Pure data structures with no I/O dependencies: documents, pages, chunks,
//! embedding rows, transient retrieval records, citations, and agent state.

pub mod agent_state;
pub mod chunk;
pub mod doc;
pub mod hit;

pub use agent_state::{AgentCounters, AgentState, Plan, PlanAction, RefusalReason, StopReason};
pub use chunk::Chunk;
pub use doc::{Document, Page};
pub use hit::{AnswerResult, Citation, ChunkHit, NegOrd, CANONICAL_REFUSAL};
