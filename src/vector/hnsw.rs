//! Optional `usearch`-backed HNSW approximate index, behind the
//! `usearch-hnsw` feature. Reused near-verbatim from the teacher's
//! `search::hnsw::HnswIndex`, adapted to this crate's `VectorIndex` trait
//! and error hierarchy.

use super::VectorIndex;
use crate::error::{ArtifactError, Error, Result};
use std::collections::HashMap;
use std::path::Path;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// Configuration for the HNSW index, mirroring the teacher's `HnswConfig`.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub dimensions: usize,
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl HnswConfig {
    #[must_use]
    pub const fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions,
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

/// HNSW vector index wrapping `usearch`, with an id-mapping sidecar so
/// `usearch`'s internal dense keys can be translated back to `vector_id`.
pub struct HnswVectorIndex {
    inner: Index,
    key_to_vector_id: HashMap<u64, usize>,
    dimensions: usize,
}

impl HnswVectorIndex {
    /// Builds a fresh HNSW index and adds every store row, keyed by
    /// `vector_id`.
    ///
    /// # Errors
    /// Returns `Error::Artifact` if index construction or insertion fails.
    pub fn build(config: &HnswConfig, vectors: &[(usize, Vec<f32>)]) -> Result<Self> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let inner = Index::new(&options).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: format!("failed to create index: {e}"),
            })
        })?;
        inner.reserve(vectors.len()).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: format!("failed to reserve capacity: {e}"),
            })
        })?;

        let mut key_to_vector_id = HashMap::with_capacity(vectors.len());
        for (vector_id, vector) in vectors {
            let key = *vector_id as u64;
            inner.add(key, vector).map_err(|e| {
                Error::Artifact(ArtifactError::Corrupt {
                    name: "hnsw.usearch".to_string(),
                    reason: format!("failed to add vector {vector_id}: {e}"),
                })
            })?;
            key_to_vector_id.insert(key, *vector_id);
        }

        Ok(Self {
            inner,
            key_to_vector_id,
            dimensions: config.dimensions,
        })
    }

    /// Persists the index plus its id-mapping sidecar (`<path>.map`).
    ///
    /// # Errors
    /// Returns `Error::Io`/`Error::Artifact` if writing fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let path_str = path.to_str().ok_or_else(|| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: "non-UTF8 path".to_string(),
            })
        })?;
        self.inner.save(path_str).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: format!("save failed: {e}"),
            })
        })?;

        let map_path = path.with_extension("usearch.map");
        let map_data = serde_json::json!({
            "key_to_vector_id": self.key_to_vector_id,
            "dimensions": self.dimensions,
        });
        std::fs::write(&map_path, serde_json::to_string(&map_data)?)?;
        Ok(())
    }

    /// Loads a previously saved index and its id-mapping sidecar.
    ///
    /// # Errors
    /// Returns `Error::Artifact` if either file is missing or corrupt.
    pub fn load(path: &Path, config: &HnswConfig) -> Result<Self> {
        let options = IndexOptions {
            dimensions: config.dimensions,
            metric: MetricKind::IP,
            quantization: ScalarKind::F32,
            connectivity: config.connectivity,
            expansion_add: config.expansion_add,
            expansion_search: config.expansion_search,
            multi: false,
        };
        let inner = Index::new(&options).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: format!("failed to create index for loading: {e}"),
            })
        })?;
        let path_str = path.to_str().ok_or_else(|| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: "non-UTF8 path".to_string(),
            })
        })?;
        inner.load(path_str).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch".to_string(),
                reason: format!("load failed: {e}"),
            })
        })?;

        let map_path = path.with_extension("usearch.map");
        let map_raw = std::fs::read_to_string(&map_path)?;
        let map_data: serde_json::Value = serde_json::from_str(&map_raw).map_err(|e| {
            Error::Artifact(ArtifactError::Corrupt {
                name: "hnsw.usearch.map".to_string(),
                reason: e.to_string(),
            })
        })?;

        let mut key_to_vector_id = HashMap::new();
        if let Some(obj) = map_data.get("key_to_vector_id").and_then(|v| v.as_object()) {
            for (k, v) in obj {
                if let (Ok(key), Some(vector_id)) = (k.parse::<u64>(), v.as_u64()) {
                    key_to_vector_id.insert(key, vector_id as usize);
                }
            }
        }

        Ok(Self {
            inner,
            key_to_vector_id,
            dimensions: config.dimensions,
        })
    }
}

impl VectorIndex for HnswVectorIndex {
    fn search_candidates(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if k == 0 || query.len() != self.dimensions {
            return Vec::new();
        }
        let Ok(results) = self.inner.search(query, k) else {
            return Vec::new();
        };
        results
            .keys
            .iter()
            .zip(results.distances.iter())
            .filter_map(|(key, distance)| {
                self.key_to_vector_id.get(key).map(|&vector_id| (vector_id, 1.0 - distance))
            })
            .collect()
    }
}
