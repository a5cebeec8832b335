//! Error types for docrag operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! every subsystem: configuration, artifact persistence, ingestion, retrieval,
//! citation enforcement, the agent loop, and evaluation.

use thiserror::Error;

/// Result type alias for docrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for docrag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (invalid backend name, non-positive numeric setting).
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Persisted artifact errors (missing or corrupt index data).
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Ingestion-pipeline errors.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Retrieval errors (vector/BM25/fusion).
    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// Citation enforcement errors.
    #[error("citation error: {0}")]
    Citation(#[from] CitationError),

    /// Agent loop errors.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Evaluator errors.
    #[error("eval error: {0}")]
    Eval(#[from] EvalError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Generator/embedder transient failures (retries exhausted).
    #[error("generator error: {0}")]
    Generator(#[from] GeneratorError),

    /// CLI command errors.
    #[error("command error: {0}")]
    Command(#[from] CommandError),

    /// Invalid state that should be unreachable given documented invariants.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },
}

impl Error {
    /// Maps this error to the process exit code it should produce, per the
    /// CLI surface contract: `0` success, `1` empty input, `2` invalid
    /// configuration, `3` missing artifacts. All other error kinds map to a
    /// generic failure code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::Artifact(_) => 3,
            Self::Ingest(IngestError::EmptyInput) => 1,
            _ => 1,
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An unknown backend name was configured.
    #[error("unknown backend: {name}")]
    UnknownBackend {
        /// The offending backend name.
        name: String,
    },

    /// A numeric setting that must be positive was zero or negative.
    #[error("setting {key} must be positive, got {value}")]
    NonPositive {
        /// Name of the offending setting.
        key: String,
        /// The invalid value.
        value: f64,
    },

    /// Settings file could not be parsed.
    #[error("failed to parse settings file {path}: {reason}")]
    ParseFailed {
        /// Path to the settings file.
        path: String,
        /// Underlying parse failure reason.
        reason: String,
    },

    /// An unknown retrieval mode was configured.
    #[error("unknown retrieval mode: {name}")]
    UnknownMode {
        /// The offending mode name.
        name: String,
    },
}

/// Persisted-artifact errors.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The index directory has not been built yet.
    #[error("index not built at {path}. Run: docrag ingest")]
    NotBuilt {
        /// Path that was expected to contain artifacts.
        path: String,
    },

    /// An artifact file was present but failed to deserialize.
    #[error("corrupt artifact {name}: {reason}")]
    Corrupt {
        /// Artifact name (e.g. `bm25.json`).
        name: String,
        /// Deserialization failure reason.
        reason: String,
    },

    /// Row misalignment between the embedding matrix and the chunk store.
    #[error("embedding store misaligned: {n_vectors} vectors but {n_rows} store rows")]
    Misaligned {
        /// Number of vector rows found.
        n_vectors: usize,
        /// Number of chunk-store rows found.
        n_rows: usize,
    },

    /// A `vector_id` sequence was not contiguous starting at 0.
    #[error("non-contiguous vector_id at index {index}: found {found}")]
    NonContiguousVectorId {
        /// Expected position in the sequence.
        index: usize,
        /// Value actually found.
        found: i64,
    },
}

/// Ingestion-pipeline errors.
#[derive(Error, Debug)]
pub enum IngestError {
    /// No pages were supplied for ingestion.
    #[error("empty input: no pages to ingest")]
    EmptyInput,

    /// The embedder returned a vector of the wrong dimension.
    #[error("embedder returned dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Dimension actually returned.
        actual: usize,
        /// Dimension expected by the store.
        expected: usize,
    },

    /// The embedder failed outright.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
}

/// Retrieval errors (vector, BM25, fusion).
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// `top_k` requested was invalid (e.g. used where positive is required).
    #[error("invalid top_k: {0}")]
    InvalidTopK(usize),

    /// RRF constant `k0` was not positive.
    #[error("rrf k0 must be positive, got {0}")]
    InvalidK0(f64),

    /// Vector index search failed.
    #[error("vector search failed: {0}")]
    VectorSearch(String),
}

/// Citation-enforcement errors (rarely surfaced; most paths resolve to a
/// refusal rather than an `Err`).
#[derive(Error, Debug)]
pub enum CitationError {
    /// Evidence selection was asked to operate on an inconsistent hit set.
    #[error("invalid evidence set: {0}")]
    InvalidEvidence(String),
}

/// Agent-loop errors (rarely surfaced; budget exhaustion is a refusal, not
/// an `Err`).
#[derive(Error, Debug)]
pub enum AgentError {
    /// The router produced a plan action with no handler.
    #[error("unhandled plan action: {0}")]
    UnhandledAction(String),
}

/// Evaluator errors.
#[derive(Error, Debug)]
pub enum EvalError {
    /// The labeled question set was empty.
    #[error("empty question set")]
    EmptyQuestionSet,

    /// A labeled question referenced an unknown `qid` twice.
    #[error("duplicate qid: {0}")]
    DuplicateQid(String),
}

/// I/O errors (file operations), mirroring the underlying `std::io::Error`
/// kind so callers can branch without downcasting.
#[derive(Error, Debug)]
pub enum IoError {
    /// Generic I/O failure with a description.
    #[error("{message}: {source}")]
    Generic {
        /// Human-readable description of the operation that failed.
        message: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generator/embedder transient-failure errors (surfaced only after retries
/// are exhausted).
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// All retry attempts failed.
    #[error("generator failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last observed failure reason.
        reason: String,
    },
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(IoError::Generic {
            message: "I/O operation failed".to_string(),
            source,
        })
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Io(IoError::Json(source))
    }
}
