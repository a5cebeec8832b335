//! Command dispatch: one `cmd_*` function per `Commands` variant, each
//! returning the fully rendered output string for its `OutputFormat`.

use super::output::{format_agent_state, format_answer, format_eval_summary, format_ingest_report, format_search_results, OutputFormat};
use super::parser::{Cli, Commands};
use crate::agent::run_agent;
use crate::bm25::{Bm25Artifact, Bm25Params};
use crate::citation::build_cited_answer;
use crate::config::{RetrievalMode, Settings, VectorBackend};
use crate::core::{AnswerResult, ChunkHit, Document, Page};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{CommandError, ConfigError, Result};
use crate::eval::{evaluate, write_eval_artifacts, LabeledQuestion};
use crate::fusion::{base_search, hybrid_search};
use crate::generator::{EchoGenerator, Generator, RetryingGenerator};
use crate::ingest::run_ingest;
use crate::store::LoadedStore;
use crate::vector::{BruteForceIndex, VectorIndex};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Dispatches `cli.command` and returns the fully rendered output.
///
/// # Errors
/// Propagates whatever error the invoked command surfaces.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let settings = Settings::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Ingest { input, doc_id } => cmd_ingest(input, doc_id.as_deref(), &cli.index_dir, &settings, format),
        Commands::Search { query, top_k } => cmd_search(query, *top_k, &cli.index_dir, &settings, format),
        Commands::Ask { question } => cmd_ask(question, &cli.index_dir, &settings, format),
        Commands::Agent { question } => cmd_agent(question, &cli.index_dir, &settings, format),
        Commands::Eval { questions, k, page_tolerance, out_dir } => {
            cmd_eval(questions, *k, *page_tolerance, out_dir.as_deref(), &cli.index_dir, &settings, format)
        }
    }
}

/// Reads a JSON Lines file of `Page` records into a single `Document`.
/// The document's `doc_id` defaults to the first page's `doc_id` unless
/// `doc_id_override` is supplied.
fn load_document(input: &Path, doc_id_override: Option<&str>) -> Result<Document> {
    let file = std::fs::File::open(input)?;
    let reader = std::io::BufReader::new(file);
    let mut pages = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let page: Page = serde_json::from_str(&line)?;
        pages.push(page);
    }
    if pages.is_empty() {
        return Err(CommandError::InvalidArgument(format!("{} contains no page records", input.display())).into());
    }
    let doc_id = doc_id_override.map_or_else(|| pages[0].doc_id.clone(), ToString::to_string);
    Ok(Document::new(doc_id, input.display().to_string(), pages))
}

fn cmd_ingest(input: &Path, doc_id_override: Option<&str>, index_dir: &Path, settings: &Settings, format: OutputFormat) -> Result<String> {
    let document = load_document(input, doc_id_override)?;
    let embedder = create_embedder()?;
    let report = run_ingest(&document, embedder.as_ref(), index_dir, settings)?;
    Ok(format_ingest_report(&report, format))
}

fn open_index(index_dir: &Path) -> Result<(LoadedStore, Bm25Artifact)> {
    let store = LoadedStore::load(index_dir)?;
    let bm25 = match Bm25Artifact::load(index_dir) {
        Ok(artifact) => artifact,
        Err(_) => Bm25Artifact::build(&[], Bm25Params::default()),
    };
    Ok((store, bm25))
}

/// Selects the dense retriever named by `settings.vector_backend`. The HNSW
/// backend is built fresh in memory from the loaded store on every call,
/// since ingest persists only the brute-force-readable matrix, not a saved
/// `usearch` index.
fn open_vector_index<'a>(store: &'a LoadedStore, settings: &Settings) -> Result<Box<dyn VectorIndex + 'a>> {
    match settings.vector_backend {
        VectorBackend::BruteForce => Ok(Box::new(BruteForceIndex::new(store))),
        VectorBackend::Hnsw => {
            #[cfg(feature = "usearch-hnsw")]
            {
                use crate::vector::{HnswConfig, HnswVectorIndex};
                let config = HnswConfig::with_dimensions(store.dimensions());
                let vectors: Vec<(usize, Vec<f32>)> = store.iter_vectors().enumerate().collect();
                let index = HnswVectorIndex::build(&config, &vectors)?;
                Ok(Box::new(index))
            }
            #[cfg(not(feature = "usearch-hnsw"))]
            {
                Err(ConfigError::UnknownBackend {
                    name: "hnsw (crate built without the usearch-hnsw feature)".to_string(),
                }
                .into())
            }
        }
    }
}

/// Dispatches retrieval on `settings.retrieval_mode`: `Base` runs the single
/// configured dense backend only, `Hybrid` fuses it with BM25.
fn retrieve(
    query: &str,
    index: &dyn VectorIndex,
    store: &LoadedStore,
    bm25: &Bm25Artifact,
    embed_query: impl Fn(&str) -> Option<Vec<f32>>,
    settings: &Settings,
) -> Vec<ChunkHit> {
    match settings.retrieval_mode {
        RetrievalMode::Base => base_search(query, index, store, bm25, embed_query, settings),
        RetrievalMode::Hybrid => hybrid_search(query, index, store, bm25, embed_query, settings),
    }
}

fn cmd_search(query: &str, top_k: Option<usize>, index_dir: &Path, settings: &Settings, format: OutputFormat) -> Result<String> {
    let (store, bm25) = open_index(index_dir)?;
    let mut settings = settings.clone();
    if let Some(top_k) = top_k {
        settings.top_k = top_k;
    }
    let index = open_vector_index(&store, &settings)?;
    let embedder = create_embedder()?;

    let embed_query = |q: &str| embedder.embed(q).ok();
    let hits = retrieve(query, index.as_ref(), &store, &bm25, embed_query, &settings);
    Ok(format_search_results(&hits, format))
}

fn retrieve_and_answer(question: &str, index_dir: &Path, settings: &Settings) -> Result<AnswerResult> {
    let (store, bm25) = open_index(index_dir)?;
    let index = open_vector_index(&store, settings)?;
    let embedder = create_embedder()?;
    let embed_query = |q: &str| embedder.embed(q).ok();
    let generator = RetryingGenerator::new(EchoGenerator);
    let generate_fn = |prompt: &str| generator.generate(prompt);

    let hits = retrieve(question, index.as_ref(), &store, &bm25, embed_query, settings);
    build_cited_answer(question, &hits, settings, generate_fn)
}

fn cmd_ask(question: &str, index_dir: &Path, settings: &Settings, format: OutputFormat) -> Result<String> {
    let answer = retrieve_and_answer(question, index_dir, settings)?;
    Ok(format_answer(&answer, format))
}

fn cmd_agent(question: &str, index_dir: &Path, settings: &Settings, format: OutputFormat) -> Result<String> {
    let (store, bm25) = open_index(index_dir)?;
    let index = open_vector_index(&store, settings)?;
    let embedder = create_embedder()?;
    let embed_query = |q: &str| embedder.embed(q).ok();
    let generator = RetryingGenerator::new(EchoGenerator);
    let generate_fn = |prompt: &str| generator.generate(prompt);

    let state = run_agent(question, index.as_ref(), &store, &bm25, embed_query, generate_fn, settings);
    Ok(format_agent_state(&state, format))
}

#[allow(clippy::too_many_arguments)]
fn cmd_eval(
    questions_path: &Path,
    k: usize,
    page_tolerance: u32,
    out_dir: Option<&Path>,
    index_dir: &Path,
    settings: &Settings,
    format: OutputFormat,
) -> Result<String> {
    let raw = std::fs::read_to_string(questions_path)?;
    let questions: Vec<LabeledQuestion> = serde_json::from_str(&raw)?;

    let (store, bm25) = open_index(index_dir)?;
    let index = open_vector_index(&store, settings)?;
    let embedder = create_embedder()?;
    let embed_query = |q: &str| embedder.embed(q).ok();
    let generator = RetryingGenerator::new(EchoGenerator);
    let generate_fn = |prompt: &str| generator.generate(prompt);

    let mut hits_by_qid: HashMap<String, Vec<ChunkHit>> = HashMap::new();
    let mut answers_by_qid: HashMap<String, AnswerResult> = HashMap::new();

    for question in &questions {
        let hits = retrieve(&question.question, index.as_ref(), &store, &bm25, embed_query, settings);
        let answer = build_cited_answer(&question.question, &hits, settings, generate_fn)?;
        hits_by_qid.insert(question.qid.clone(), hits);
        answers_by_qid.insert(question.qid.clone(), answer);
    }

    let summary = evaluate(&questions, &hits_by_qid, Some(&answers_by_qid), k, page_tolerance)?;
    if let Some(out_dir) = out_dir {
        write_eval_artifacts(&summary, out_dir)?;
    }
    Ok(format_eval_summary(&summary, format))
}
