//! Ingest pipeline (C10): raw pages -> clean -> chunk -> embed -> persisted
//! store + BM25 artifact, one `index_dir` at a time.
//!
//! Grounded on the teacher's `cli::commands::cmd_load` (read file, chunk,
//! store, embed, all in one command) and `search::embed_buffer_chunks`
//! (batch embedding against storage); generalized here to the multi-stage
//! C1->C2->C3/C5 pipeline and to support incremental re-ingestion into an
//! existing `index_dir` rather than a single SQLite buffer.

use crate::bm25::{Bm25Artifact, Bm25Params};
use crate::clean::{clean_page_text, detect_boilerplate, CleanConfig};
use crate::chunking::chunk_pages;
use crate::config::Settings;
use crate::core::{Document, Page};
use crate::embedding::Embedder;
use crate::error::{ArtifactError, Error, IngestError, Result};
use crate::store::{build_store, embed_store, persist_store, LoadedStore, StoreRow};
use rayon::prelude::*;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Number of chunk texts embedded per `rayon`-parallel batch.
const EMBED_BATCH_SIZE: usize = 64;

/// Summary of one `run_ingest` call.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// Document identifier that was ingested.
    pub doc_id: String,
    /// Number of raw pages consumed.
    pub pages_ingested: usize,
    /// Number of non-empty chunks produced from this document.
    pub chunks_created: usize,
    /// Number of vectors newly embedded (equal to `chunks_created`).
    pub vectors_embedded: usize,
    /// Total chunk count across the whole `index_dir` after this ingest.
    pub total_chunks_in_index: usize,
}

fn embed_all(embedder: &dyn Embedder, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let batches: Vec<Result<Vec<Vec<f32>>>> = texts
        .chunks(EMBED_BATCH_SIZE)
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|batch| embed_store(embedder, batch))
        .collect();

    let mut out = Vec::with_capacity(texts.len());
    for batch in batches {
        out.extend(batch?);
    }
    Ok(out)
}

fn load_existing(index_dir: &Path) -> Result<Option<(Vec<StoreRow>, Vec<Vec<f32>>)>> {
    match LoadedStore::load(index_dir) {
        Ok(store) => {
            let vectors: Vec<Vec<f32>> = store.iter_vectors().collect();
            Ok(Some((store.rows, vectors)))
        }
        Err(Error::Artifact(ArtifactError::NotBuilt { .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Appends `document`'s raw pages to `pages.jsonl` under `index_dir`.
fn append_pages(index_dir: &Path, document: &Document) -> Result<()> {
    std::fs::create_dir_all(index_dir)?;
    let path = index_dir.join("pages.jsonl");
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for page in &document.pages {
        let line = serde_json::to_string(page)?;
        writeln!(file, "{line}")?;
    }
    Ok(())
}

/// Runs the full ingest pipeline for `document` against `index_dir`,
/// appending to any chunk store and BM25 artifact already present there.
///
/// Not safe to call concurrently against the same `index_dir`: each call
/// reads the prior artifacts, rewrites them in full, and rebuilds the BM25
/// index from the combined row set.
///
/// # Errors
/// Returns `Error::Ingest(EmptyInput)` if `document` has no pages, and
/// propagates any embedding or artifact I/O failure.
#[tracing::instrument(skip(document, embedder, settings), fields(doc_id = %document.doc_id))]
pub fn run_ingest(document: &Document, embedder: &dyn Embedder, index_dir: &Path, settings: &Settings) -> Result<IngestReport> {
    if document.pages.is_empty() {
        return Err(IngestError::EmptyInput.into());
    }

    append_pages(index_dir, document)?;

    let clean_config = CleanConfig {
        header_footer_lines: settings.boilerplate_header_footer_lines,
        boilerplate_ratio: settings.boilerplate_ratio,
        ..CleanConfig::default()
    };
    let boilerplate = detect_boilerplate(&document.pages, &clean_config);
    let empty = std::collections::HashSet::new();
    let doc_boilerplate = boilerplate.get(&document.doc_id).unwrap_or(&empty);

    let cleaned_pages: Vec<Page> = document
        .pages
        .iter()
        .map(|page| Page::new(page.doc_id.clone(), page.page_number, clean_page_text(&page.text, doc_boilerplate, &clean_config)))
        .collect();

    let chunks = chunk_pages(&cleaned_pages, settings);
    let (texts, mut new_rows) = build_store(&chunks);
    let new_vectors = embed_all(embedder, &texts)?;

    let existing = load_existing(index_dir)?;
    let (mut all_rows, mut all_vectors) = existing.unwrap_or_default();
    let offset = all_rows.len();
    for row in &mut new_rows {
        row.vector_id += offset;
    }
    all_rows.append(&mut new_rows);
    all_vectors.extend(new_vectors.iter().cloned());

    persist_store(index_dir, &all_rows, &all_vectors, &settings.embedder_model_name)?;

    let bm25 = Bm25Artifact::build(&all_rows, Bm25Params::default());
    bm25.save(index_dir)?;

    let report = IngestReport {
        doc_id: document.doc_id.clone(),
        pages_ingested: document.pages.len(),
        chunks_created: texts.len(),
        vectors_embedded: new_vectors.len(),
        total_chunks_in_index: all_rows.len(),
    };
    info!(
        pages = report.pages_ingested,
        chunks = report.chunks_created,
        vectors = report.vectors_embedded,
        total_chunks = report.total_chunks_in_index,
        "ingest complete"
    );
    Ok(report)
}
