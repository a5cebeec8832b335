//! `FastEmbed`-based semantic embedder.
//!
//! Real semantic embeddings using the all-MiniLM-L6-v2 model via
//! `fastembed-rs`. Only compiled when the `fastembed-embeddings` feature is
//! enabled. Grounded on the teacher's `embedding::fastembed_impl`, reusing
//! its `OnceLock<Mutex<...>>` singleton and `catch_unwind` guard around the
//! ONNX runtime call.

use crate::embedding::{Embedder, DEFAULT_DIMENSIONS};
use crate::error::{Error, IngestError, Result};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

static EMBEDDING_MODEL: OnceLock<std::sync::Mutex<fastembed::TextEmbedding>> = OnceLock::new();

/// `FastEmbed` embedder using all-MiniLM-L6-v2. The model is lazily loaded
/// on first `embed()` call to preserve cold start time.
pub struct FastEmbedEmbedder {
    model_name: &'static str,
}

impl FastEmbedEmbedder {
    /// Creates a new `FastEmbed` embedder. The model itself is loaded
    /// lazily on first `embed()` call.
    #[allow(clippy::missing_const_for_fn)]
    pub fn new() -> Result<Self> {
        Ok(Self {
            model_name: "all-MiniLM-L6-v2",
        })
    }

    fn get_model() -> Result<&'static std::sync::Mutex<fastembed::TextEmbedding>> {
        if let Some(model) = EMBEDDING_MODEL.get() {
            return Ok(model);
        }
        let options = fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
            .with_show_download_progress(false);
        let model = fastembed::TextEmbedding::try_new(options)
            .map_err(|e| IngestError::EmbeddingFailed(format!("failed to load embedding model: {e}")))?;
        let _ = EMBEDDING_MODEL.set(std::sync::Mutex::new(model));
        EMBEDDING_MODEL
            .get()
            .ok_or_else(|| IngestError::EmbeddingFailed("model initialization race condition".to_string()).into())
    }

    /// Returns the model name.
    #[must_use]
    pub const fn model_name(&self) -> &'static str {
        self.model_name
    }
}

impl Embedder for FastEmbedEmbedder {
    fn dimensions(&self) -> usize {
        DEFAULT_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(Error::Ingest(IngestError::EmbeddingFailed(
                "cannot embed empty text".to_string(),
            )));
        }

        let model = Self::get_model()?;
        let mut model = model
            .lock()
            .map_err(|e| IngestError::EmbeddingFailed(format!("failed to lock embedding model: {e}")))?;

        let texts = [text];
        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts, None)));

        let embeddings = result
            .map_err(|panic_info| {
                let message = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                IngestError::EmbeddingFailed(format!("ONNX runtime panic: {message}"))
            })?
            .map_err(|e| IngestError::EmbeddingFailed(format!("embedding failed: {e}")))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::EmbeddingFailed("no embedding returned from model".to_string()).into())
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.is_empty()) {
            return Err(Error::Ingest(IngestError::EmbeddingFailed(
                "cannot embed empty text".to_string(),
            )));
        }

        let model = Self::get_model()?;
        let mut model = model
            .lock()
            .map_err(|e| IngestError::EmbeddingFailed(format!("failed to lock embedding model: {e}")))?;

        let result = catch_unwind(AssertUnwindSafe(|| model.embed(texts.to_vec(), None)));

        result
            .map_err(|panic_info| {
                let message = panic_info
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic_info.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Error::Ingest(IngestError::EmbeddingFailed(format!("ONNX runtime panic: {message}")))
            })?
            .map_err(|e| Error::Ingest(IngestError::EmbeddingFailed(format!("batch embedding failed: {e}"))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_creation_succeeds() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        assert_eq!(embedder.dimensions(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn model_name_is_all_minilm() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        assert_eq!(embedder.model_name(), "all-MiniLM-L6-v2");
    }

    #[test]
    fn empty_text_is_rejected() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        assert!(embedder.embed("").is_err());
    }

    #[test]
    fn empty_batch_returns_empty_vec() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        let result = embedder.embed_batch(&[]).expect("batch");
        assert!(result.is_empty());
    }

    #[test]
    fn batch_with_empty_text_is_rejected() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        let texts = vec!["valid", "", "also valid"];
        assert!(embedder.embed_batch(&texts).is_err());
    }

    #[test]
    #[ignore = "requires fastembed model download"]
    fn embed_returns_correct_dimensions() {
        let embedder = FastEmbedEmbedder::new().expect("create");
        let result = embedder.embed("Hello, world!").expect("embed");
        assert_eq!(result.len(), DEFAULT_DIMENSIONS);
    }
}
