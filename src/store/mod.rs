//! Embedding store (C3): aligned `(vector, metadata)` rows persisted as a
//! chunk-store JSONL sidecar plus a raw float matrix and manifest.
//!
//! Grounded on the teacher's tendency to pair a binary payload with a small
//! JSON sidecar for feature-gated artifacts (`search::hnsw::HnswIndex::save`
//! writes an index file plus a `.map` JSON sidecar); the row-aligned JSONL +
//! matrix split itself mirrors `SPEC_FULL.md` ?4.3/?6.
//!
//! Memory mapping requires unsafe but is read-only, following the teacher's
//! `io::reader::FileReader` convention.
#![allow(unsafe_code)]

use crate::core::Chunk;
use crate::embedding::Embedder;
use crate::error::{ArtifactError, Error, IngestError, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// One row of the persisted chunk store, aligned by `vector_id` with the
/// embedding matrix file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRow {
    pub vector_id: usize,
    pub chunk_id: String,
    pub doc_id: String,
    pub start_page: u32,
    pub end_page: u32,
    pub text: String,
}

/// Sidecar manifest describing the embedding matrix file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingManifest {
    pub model_name: String,
    pub n_vectors: usize,
    pub dimensions: usize,
    pub normalized: bool,
}

/// Builds the aligned `(texts, store_rows)` pair from a chunk list, skipping
/// chunks whose trimmed text is empty. Preserves input order, which is
/// already deterministic from C2.
#[must_use]
pub fn build_store(chunks: &[Chunk]) -> (Vec<String>, Vec<StoreRow>) {
    let mut texts = Vec::new();
    let mut rows = Vec::new();
    for chunk in chunks {
        let trimmed = chunk.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let vector_id = rows.len();
        rows.push(StoreRow {
            vector_id,
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
            start_page: chunk.start_page,
            end_page: chunk.end_page,
            text: trimmed.to_string(),
        });
        texts.push(trimmed.to_string());
    }
    (texts, rows)
}

/// Embeds `texts` in batch and validates the result is row-aligned and of
/// the embedder's declared dimension before returning it.
///
/// # Errors
/// Returns `Error::Ingest` if the embedder returns a mismatched row count or
/// a vector of the wrong dimension for any row.
pub fn embed_store(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = embedder.embed_batch(&refs)?;

    if vectors.len() != texts.len() {
        return Err(Error::Artifact(ArtifactError::Misaligned {
            n_vectors: vectors.len(),
            n_rows: texts.len(),
        }));
    }
    let expected = embedder.dimensions();
    for vector in &vectors {
        if vector.len() != expected {
            return Err(Error::Ingest(IngestError::DimensionMismatch {
                actual: vector.len(),
                expected,
            }));
        }
    }
    Ok(vectors)
}

/// Persists `rows`/`vectors` to `index_dir` as `chunk_store.jsonl`,
/// `embeddings.bin` (row-major little-endian f32), and
/// `embeddings.manifest.json`.
///
/// # Errors
/// Returns `Error::Io` on any filesystem failure, or `Error::Artifact` if
/// `rows` and `vectors` are misaligned or `vector_id` is non-contiguous.
pub fn persist_store(
    index_dir: &Path,
    rows: &[StoreRow],
    vectors: &[Vec<f32>],
    model_name: &str,
) -> Result<()> {
    if rows.len() != vectors.len() {
        return Err(Error::Artifact(ArtifactError::Misaligned {
            n_vectors: vectors.len(),
            n_rows: rows.len(),
        }));
    }
    for (i, row) in rows.iter().enumerate() {
        if row.vector_id != i {
            return Err(Error::Artifact(ArtifactError::NonContiguousVectorId {
                index: i,
                found: i64::try_from(row.vector_id).unwrap_or(-1),
            }));
        }
    }

    std::fs::create_dir_all(index_dir)?;

    let dimensions = vectors.first().map_or(0, Vec::len);

    let store_path = index_dir.join("chunk_store.jsonl");
    let mut store_file = File::create(&store_path)?;
    for row in rows {
        let line = serde_json::to_string(row)?;
        writeln!(store_file, "{line}")?;
    }

    let matrix_path = index_dir.join("embeddings.bin");
    let mut matrix_file = File::create(&matrix_path)?;
    for vector in vectors {
        for value in vector {
            matrix_file.write_all(&value.to_le_bytes())?;
        }
    }

    let manifest = EmbeddingManifest {
        model_name: model_name.to_string(),
        n_vectors: vectors.len(),
        dimensions,
        normalized: true,
    };
    let manifest_path = index_dir.join("embeddings.manifest.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;

    Ok(())
}

/// A loaded, read-only embedding store: row metadata plus the memory-mapped
/// vector matrix. Safe to share across concurrent queries (`Arc`-wrapped by
/// callers), since nothing here is mutated after load.
pub struct LoadedStore {
    pub rows: Vec<StoreRow>,
    pub manifest: EmbeddingManifest,
    mmap: Mmap,
}

impl LoadedStore {
    /// Loads a previously persisted store from `index_dir`.
    ///
    /// # Errors
    /// Returns `Error::Artifact` if any artifact file is missing or corrupt,
    /// or the row count disagrees between the chunk store and the manifest.
    pub fn load(index_dir: &Path) -> Result<Self> {
        let store_path = index_dir.join("chunk_store.jsonl");
        let matrix_path = index_dir.join("embeddings.bin");
        let manifest_path = index_dir.join("embeddings.manifest.json");

        if !store_path.exists() || !matrix_path.exists() || !manifest_path.exists() {
            return Err(Error::Artifact(ArtifactError::NotBuilt {
                path: index_dir.display().to_string(),
            }));
        }

        let manifest_raw = std::fs::read_to_string(&manifest_path)?;
        let manifest: EmbeddingManifest = serde_json::from_str(&manifest_raw).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "embeddings.manifest.json".to_string(),
                reason: e.to_string(),
            })
        })?;

        let file = File::open(&store_path)?;
        let reader = BufReader::new(file);
        let mut rows = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row: StoreRow = serde_json::from_str(&line).map_err(|e| {
                Error::Artifact(ArtifactError::Corrupt {
                    name: "chunk_store.jsonl".to_string(),
                    reason: e.to_string(),
                })
            })?;
            rows.push(row);
        }

        if rows.len() != manifest.n_vectors {
            return Err(Error::Artifact(ArtifactError::Misaligned {
                n_vectors: manifest.n_vectors,
                n_rows: rows.len(),
            }));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.vector_id != i {
                return Err(Error::Artifact(ArtifactError::NonContiguousVectorId {
                    index: i,
                    found: i64::try_from(row.vector_id).unwrap_or(-1),
                }));
            }
        }

        let matrix_file = File::open(&matrix_path)?;
        // Safety: we only read from the file, which is read-only after
        // ingest per ?5; no concurrent writer can mutate it underneath us.
        let mmap = unsafe { Mmap::map(&matrix_file) }?;

        let expected_bytes = manifest.n_vectors * manifest.dimensions * std::mem::size_of::<f32>();
        if mmap.len() != expected_bytes {
            return Err(Error::Artifact(ArtifactError::Corrupt {
                name: "embeddings.bin".to_string(),
                reason: format!("expected {expected_bytes} bytes, found {}", mmap.len()),
            }));
        }

        Ok(Self { rows, manifest, mmap })
    }

    /// Returns the dimensions of vectors in this store.
    #[must_use]
    pub const fn dimensions(&self) -> usize {
        self.manifest.dimensions
    }

    /// Returns the number of vectors in this store.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.manifest.n_vectors
    }

    /// Returns true if the store has no vectors.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.manifest.n_vectors == 0
    }

    /// Returns the vector at `vector_id`, decoded from the memory-mapped
    /// matrix. Decodes into an owned `Vec<f32>` rather than reinterpreting
    /// the mapped bytes in place, since mmap offsets are not guaranteed to
    /// satisfy `f32`'s alignment.
    #[must_use]
    pub fn vector(&self, vector_id: usize) -> Option<Vec<f32>> {
        let dims = self.dimensions();
        let start = vector_id.checked_mul(dims)?;
        let byte_start = start.checked_mul(std::mem::size_of::<f32>())?;
        let byte_len = dims.checked_mul(std::mem::size_of::<f32>())?;
        let bytes = self.mmap.get(byte_start..byte_start + byte_len)?;
        Some(
            bytes
                .chunks_exact(std::mem::size_of::<f32>())
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect(),
        )
    }

    /// Iterates all vectors in `vector_id` order.
    pub fn iter_vectors(&self) -> impl Iterator<Item = Vec<f32>> + '_ {
        (0..self.len()).map(move |i| self.vector(i).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;

    fn sample_chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("d::p0001::c000".to_string(), "d".to_string(), 1, 1, "hello world".to_string()),
            Chunk::new("d::p0002::c000".to_string(), "d".to_string(), 2, 2, String::new()),
            Chunk::new("d::p0003::c000".to_string(), "d".to_string(), 3, 3, "goodbye world".to_string()),
        ]
    }

    #[test]
    fn build_store_skips_empty_chunks_and_assigns_contiguous_ids() {
        let (texts, rows) = build_store(&sample_chunks());
        assert_eq!(texts.len(), 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].vector_id, 0);
        assert_eq!(rows[1].vector_id, 1);
        assert_eq!(rows[1].chunk_id, "d::p0003::c000");
    }

    #[test]
    fn embed_store_validates_dimensions() {
        let (texts, _) = build_store(&sample_chunks());
        let embedder = FallbackEmbedder::new(384);
        let vectors = embed_store(&embedder, &texts).expect("embed");
        assert_eq!(vectors.len(), texts.len());
        assert!(vectors.iter().all(|v| v.len() == 384));
    }

    #[test]
    fn persist_and_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (texts, rows) = build_store(&sample_chunks());
        let embedder = FallbackEmbedder::new(16);
        let vectors = embed_store(&embedder, &texts).expect("embed");
        persist_store(dir.path(), &rows, &vectors, "test-model").expect("persist");

        let loaded = LoadedStore::load(dir.path()).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dimensions(), 16);
        assert_eq!(loaded.manifest.model_name, "test-model");
        let v0 = loaded.vector(0).expect("vector 0");
        assert_eq!(v0.len(), 16);
        assert_eq!(v0, vectors[0]);
    }

    #[test]
    fn persist_rejects_misaligned_rows_and_vectors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (_, rows) = build_store(&sample_chunks());
        let vectors = vec![vec![0.0f32; 4]];
        let result = persist_store(dir.path(), &rows, &vectors, "m");
        assert!(result.is_err());
    }

    #[test]
    fn load_missing_artifact_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = LoadedStore::load(dir.path());
        assert!(result.is_err());
    }
}
