//! Output formatting: `text` vs `json` rendering for every command result.

use crate::core::{AgentState, AnswerResult, ChunkHit};
use crate::error::{
    AgentError, ArtifactError, CitationError, CommandError, ConfigError, Error, EvalError, GeneratorError, IngestError, IoError,
    RetrievalError,
};
use crate::eval::EvalSummary;
use crate::ingest::IngestReport;
use serde::Serialize;
use serde_json::json;

/// Rendering mode selected by `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a `--format` value, defaulting to `Text` for anything
    /// unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Serializes `value` as pretty JSON, falling back to `"{}"` on failure
/// (which should be unreachable for the types this module formats).
fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Renders an `IngestReport`.
#[must_use]
pub fn format_ingest_report(report: &IngestReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "ingested {} ({} pages, {} chunks, {} vectors embedded; {} chunks total in index)",
            report.doc_id, report.pages_ingested, report.chunks_created, report.vectors_embedded, report.total_chunks_in_index
        ),
        OutputFormat::Json => format_json(report),
    }
}

/// Renders a ranked list of `ChunkHit`s.
#[must_use]
pub fn format_search_results(hits: &[ChunkHit], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if hits.is_empty() {
                return "no results".to_string();
            }
            hits.iter()
                .enumerate()
                .map(|(i, hit)| format!("{}. [{:.4}] {} p{}-p{} ({})\n{}", i + 1, hit.score, hit.doc_id, hit.start_page, hit.end_page, hit.chunk_id, hit.text.trim()))
                .collect::<Vec<_>>()
                .join("\n\n")
        }
        OutputFormat::Json => format_json(&json!({ "hits": hits })),
    }
}

/// Renders an `AnswerResult`.
#[must_use]
pub fn format_answer(answer: &AnswerResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            if answer.is_refusal {
                answer.answer_text.clone()
            } else {
                let citations = answer
                    .citations
                    .iter()
                    .map(|c| format!("[{}] {} p{}-p{}", c.key, c.doc_id, c.start_page, c.end_page))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{}\n\nCitations:\n{citations}", answer.answer_text)
            }
        }
        OutputFormat::Json => format_json(answer),
    }
}

/// Renders an `AgentState`, including its node trace and stop/refusal reasons.
#[must_use]
pub fn format_agent_state(state: &AgentState, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => {
            let mut out = state.final_answer.clone().unwrap_or_default();
            out.push_str("\n\ntrace:\n");
            out.push_str(&state.trace.join("\n"));
            if let Some(reason) = state.refusal_reason {
                out.push_str(&format!("\n\nrefusal_reason: {}", reason.as_str()));
            }
            out
        }
        OutputFormat::Json => format_json(state),
    }
}

/// Renders an `EvalSummary`.
#[must_use]
pub fn format_eval_summary(summary: &EvalSummary, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "k={} answerable={} unanswerable={}\n\
             recall@k={:.4} mrr@k={:.4} ndcg@k={:.4}\n\
             doc_only_recall@k={:.4} near_page_recall@k={:.4}\n\
             refusal_accuracy={}\ncitation_compliance={}",
            summary.k,
            summary.n_answerable,
            summary.n_unanswerable,
            summary.mean_recall_at_k,
            summary.mean_mrr_at_k,
            summary.mean_ndcg_at_k,
            summary.mean_doc_only_recall_at_k,
            summary.mean_near_page_recall_at_k,
            summary.refusal_accuracy.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}")),
            summary.citation_compliance.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}")),
        ),
        OutputFormat::Json => format_json(summary),
    }
}

/// Maps every `Error` variant to a stable `(error_type, suggestion)` pair for
/// JSON-mode error payloads.
#[must_use]
const fn get_error_details(error: &Error) -> (&'static str, Option<&'static str>) {
    match error {
        Error::Config(inner) => match inner {
            ConfigError::UnknownBackend { .. } => ("config.unknown_backend", Some("use \"brute_force\" or \"hnsw\"")),
            ConfigError::NonPositive { .. } => ("config.non_positive", Some("check the settings file for zero/negative values")),
            ConfigError::ParseFailed { .. } => ("config.parse_failed", Some("validate the settings file is well-formed JSON")),
            ConfigError::UnknownMode { .. } => ("config.unknown_mode", Some("use \"base\" or \"hybrid\"")),
        },
        Error::Artifact(inner) => match inner {
            ArtifactError::NotBuilt { .. } => ("artifact.not_built", Some("run `docrag ingest` first")),
            ArtifactError::Corrupt { .. } => ("artifact.corrupt", Some("rebuild the index with `docrag ingest`")),
            ArtifactError::Misaligned { .. } => ("artifact.misaligned", Some("rebuild the index with `docrag ingest`")),
            ArtifactError::NonContiguousVectorId { .. } => ("artifact.non_contiguous_vector_id", Some("rebuild the index with `docrag ingest`")),
        },
        Error::Ingest(inner) => match inner {
            IngestError::EmptyInput => ("ingest.empty_input", Some("supply at least one page")),
            IngestError::DimensionMismatch { .. } => ("ingest.dimension_mismatch", None),
            IngestError::EmbeddingFailed(_) => ("ingest.embedding_failed", None),
        },
        Error::Retrieval(inner) => match inner {
            RetrievalError::InvalidTopK(_) => ("retrieval.invalid_top_k", Some("top_k must be positive")),
            RetrievalError::InvalidK0(_) => ("retrieval.invalid_k0", Some("rrf_k0 must be positive")),
            RetrievalError::VectorSearch(_) => ("retrieval.vector_search_failed", None),
        },
        Error::Citation(inner) => match inner {
            CitationError::InvalidEvidence(_) => ("citation.invalid_evidence", None),
        },
        Error::Agent(inner) => match inner {
            AgentError::UnhandledAction(_) => ("agent.unhandled_action", None),
        },
        Error::Eval(inner) => match inner {
            EvalError::EmptyQuestionSet => ("eval.empty_question_set", Some("supply at least one labeled question")),
            EvalError::DuplicateQid(_) => ("eval.duplicate_qid", Some("each qid must be unique")),
        },
        Error::Io(inner) => match inner {
            IoError::Generic { .. } => ("io.generic", None),
            IoError::Json(_) => ("io.json", Some("check the input file is valid JSON")),
        },
        Error::Generator(inner) => match inner {
            GeneratorError::RetriesExhausted { .. } => ("generator.retries_exhausted", None),
        },
        Error::Command(inner) => match inner {
            CommandError::InvalidArgument(_) => ("command.invalid_argument", None),
        },
        Error::InvalidState { .. } => ("invalid_state", None),
    }
}

/// Renders an `Error` for either text (plain message) or JSON
/// (`{success, error: {type, message, suggestion}}`) output.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            let (error_type, suggestion) = get_error_details(error);
            format_json(&json!({
                "success": false,
                "error": {
                    "type": error_type,
                    "message": error.to_string(),
                    "suggestion": suggestion,
                }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive_and_defaults_to_text() {
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("bogus"), OutputFormat::Text);
    }

    #[test]
    fn format_error_text_is_plain_message() {
        let err: Error = IngestError::EmptyInput.into();
        assert_eq!(format_error(&err, OutputFormat::Text), err.to_string());
    }

    #[test]
    fn format_error_json_includes_error_type_and_suggestion() {
        let err: Error = ArtifactError::NotBuilt { path: "/tmp/idx".to_string() }.into();
        let rendered = format_error(&err, OutputFormat::Json);
        assert!(rendered.contains("\"artifact.not_built\""));
        assert!(rendered.contains("docrag ingest"));
    }

    #[test]
    fn format_search_results_text_lists_each_hit() {
        let hits = vec![ChunkHit { score: 0.5, chunk_id: "c1".to_string(), doc_id: "d".to_string(), start_page: 1, end_page: 1, text: "hello".to_string() }];
        let rendered = format_search_results(&hits, OutputFormat::Text);
        assert!(rendered.contains("d p1-p1"));
    }

    #[test]
    fn format_search_results_text_handles_empty() {
        assert_eq!(format_search_results(&[], OutputFormat::Text), "no results");
    }

    #[test]
    fn format_answer_text_includes_citations() {
        let answer = AnswerResult::accepted(
            "fact [c1].".to_string(),
            vec![crate::core::Citation { key: "c1".to_string(), doc_id: "d".to_string(), start_page: 1, end_page: 1, chunk_id: "c1".to_string() }],
        );
        let rendered = format_answer(&answer, OutputFormat::Text);
        assert!(rendered.contains("Citations:"));
        assert!(rendered.contains("[c1]"));
    }
}
