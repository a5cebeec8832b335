//! Document and page representations.

use serde::{Deserialize, Serialize};

/// A single page of raw or cleaned text from a source document.
///
/// Produced externally by a PDF parser (raw) and refined by the cleaner
/// into its clean form; both stages share this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Identifier of the document this page belongs to.
    pub doc_id: String,
    /// 1-based page number.
    pub page_number: u32,
    /// Page text (raw as extracted, or clean after C1 has run).
    pub text: String,
}

impl Page {
    /// Creates a new page record.
    #[must_use]
    pub const fn new(doc_id: String, page_number: u32, text: String) -> Self {
        Self {
            doc_id,
            page_number,
            text,
        }
    }
}

/// An immutable, ordered document: an identifier, a source path, and its
/// pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque document identifier.
    pub doc_id: String,
    /// Source path the pages were extracted from.
    pub source_path: String,
    /// Ordered pages, 1-based `page_number`.
    pub pages: Vec<Page>,
}

impl Document {
    /// Creates a new document from an ordered page list.
    #[must_use]
    pub const fn new(doc_id: String, source_path: String, pages: Vec<Page>) -> Self {
        Self {
            doc_id,
            source_path,
            pages,
        }
    }
}
