//! Chunk representation: the atom of retrieval.
//!
//! Chunks are produced by the chunker (C2) from cleaned pages. Each chunk
//! always has `start_page == end_page`: this crate implements the per-page
//! chunking variant exclusively (see `SPEC_FULL.md` ?9).

use serde::{Deserialize, Serialize};

/// A bounded, page-addressed unit of text used as the atom of retrieval.
///
/// # Examples
///
/// ```
/// use docrag::core::Chunk;
///
/// let chunk = Chunk::new("doc-1::p0001::c000".to_string(), "doc-1".to_string(), 1, 1, "Hello, world!".to_string());
/// assert_eq!(chunk.char_len, 13);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable, globally unique identifier: `{doc_id}::p{NNNN}::c{MMM}`.
    pub chunk_id: String,
    /// Identifier of the owning document.
    pub doc_id: String,
    /// First page the chunk's text was drawn from (inclusive).
    pub start_page: u32,
    /// Last page the chunk's text was drawn from (inclusive). Always equal
    /// to `start_page` for this crate's per-page chunker.
    pub end_page: u32,
    /// Chunk text, non-empty after trim.
    pub text: String,
    /// Character length of `text`.
    pub char_len: usize,
    /// Approximate token count (~4 characters per token).
    pub approx_tokens: usize,
}

impl Chunk {
    /// Creates a new chunk, computing `char_len` and `approx_tokens` from
    /// `text`.
    #[must_use]
    pub fn new(chunk_id: String, doc_id: String, start_page: u32, end_page: u32, text: String) -> Self {
        let char_len = text.chars().count();
        let approx_tokens = char_len.div_ceil(4);
        Self {
            chunk_id,
            doc_id,
            start_page,
            end_page,
            text,
            char_len,
            approx_tokens,
        }
    }

    /// Builds the stable chunk identifier for a given page and per-page
    /// index: `{doc_id}::p{page:04}::c{index:03}`.
    #[must_use]
    pub fn make_id(doc_id: &str, page: u32, index: usize) -> String {
        format!("{doc_id}::p{page:04}::c{index:03}")
    }
}
