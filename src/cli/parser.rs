//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Citation-grounded retrieval over a corpus of technical documents.
#[derive(Debug, Parser)]
#[command(name = "docrag", version, about = "Citation-grounded document retrieval and Q&A")]
pub struct Cli {
    /// Directory holding the persisted index artifacts.
    #[arg(long, global = true, env = "DOCRAG_INDEX_DIR", default_value = "./index")]
    pub index_dir: PathBuf,

    /// Path to a JSON settings file, overriding the default resolution order.
    #[arg(long, global = true, env = "DOCRAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format: `text` or `json`.
    #[arg(long, global = true, default_value = "text")]
    pub format: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a document's pages into the index (builds or extends `index_dir`).
    Ingest {
        /// Path to a JSON Lines file of `{doc_id, page_number, text}` page records.
        #[arg(long)]
        input: PathBuf,

        /// Document identifier, overriding the one found in `input`'s pages.
        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Run hybrid retrieval for a query and print the ranked chunk hits.
    Search {
        /// The search query.
        query: String,

        /// Number of results to return, overriding the configured `top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Answer a question directly (single retrieval pass, no agent loop).
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Answer a question via the bounded retrieve-assess-refine agent loop.
    Agent {
        /// The question to answer.
        question: String,
    },

    /// Evaluate retrieval and answer quality against a labeled question set.
    Eval {
        /// Path to a JSON file containing an array of labeled questions.
        #[arg(long)]
        questions: PathBuf,

        /// Cutoff rank `k` for Recall/MRR/nDCG.
        #[arg(long, default_value_t = 10)]
        k: usize,

        /// Page tolerance (in pages) for the near-page-match diagnostic.
        #[arg(long, default_value_t = 1)]
        page_tolerance: u32,

        /// Directory to write `eval_results.jsonl`/`eval_summary.{json,md}` into.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_search_with_top_k() {
        let cli = Cli::parse_from(["docrag", "search", "hello world", "--top-k", "5"]);
        match cli.command {
            Commands::Search { query, top_k } => {
                assert_eq!(query, "hello world");
                assert_eq!(top_k, Some(5));
            }
            other => panic!("expected Search, got {other:?}"),
        }
    }

    #[test]
    fn defaults_format_to_text() {
        let cli = Cli::parse_from(["docrag", "ask", "what is it?"]);
        assert_eq!(cli.format, "text");
    }
}
