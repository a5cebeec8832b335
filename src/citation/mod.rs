//! Citation enforcer (C7): evidence selection, prompt construction, and
//! strict validation of generator output against assigned citation keys.
//!
//! Grounded almost 1:1 on `original_source/rag/rag_answer.py`
//! (`select_evidence`, `build_context_and_citations`,
//! `enforce_inline_citations`, `build_cited_answer`), restructured into the
//! teacher's module layout.

mod fallback;

pub use fallback::{algorithm_steps_fallback, comparison_fallback};

use crate::config::Settings;
use crate::core::{AnswerResult, ChunkHit, Citation, NegOrd, CANONICAL_REFUSAL};
use crate::error::Result;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

static CITE_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]").expect("valid regex"));
static CITE_KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)c(\d+)").expect("valid regex"));
static SENTENCE_BOUNDARY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.?!]\s+").expect("valid regex"));

fn refusal_variant(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    lowered == CANONICAL_REFUSAL || lowered == "not found" || lowered == "not found in documents"
}

/// Deduplicates hits by `chunk_id` (keeping max score), sorts by
/// `(-score, doc_id, start_page, end_page, chunk_id)`, and budgets by
/// `max_context_chunks`/`max_context_chars`. The first accepted chunk is
/// always admitted even if it alone exceeds the char budget.
#[must_use]
pub fn select_evidence(hits: &[ChunkHit], settings: &Settings) -> Vec<ChunkHit> {
    let mut best: HashMap<String, ChunkHit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.chunk_id) {
            Some(prev) if prev.score >= hit.score => {}
            _ => {
                best.insert(hit.chunk_id.clone(), hit.clone());
            }
        }
    }

    let mut ordered: Vec<ChunkHit> = best.into_values().collect();
    ordered.sort_by_key(ChunkHit::evidence_sort_key);
    ordered.truncate(settings.max_context_chunks);

    let mut budgeted = Vec::new();
    let mut total = 0usize;
    for hit in ordered {
        let len = hit.text.trim().chars().count();
        if len == 0 {
            continue;
        }
        if total + len > settings.max_context_chars && !budgeted.is_empty() {
            break;
        }
        total += len;
        budgeted.push(hit);
    }
    budgeted
}

/// Expands `primary` evidence with same-document neighbor chunks whose
/// `vector_id` (position in `all_rows`, matching store order) is within
/// `+-window`. Neighbor scores are slightly below the parent to preserve
/// relative order; dedup by `chunk_id` is maintained by the caller via
/// `select_evidence`'s subsequent pass.
#[must_use]
pub fn expand_with_neighbors(
    primary: &[ChunkHit],
    all_rows: &[crate::store::StoreRow],
    window: usize,
) -> Vec<ChunkHit> {
    if window == 0 {
        return primary.to_vec();
    }

    let index_by_chunk_id: HashMap<&str, usize> =
        all_rows.iter().enumerate().map(|(i, row)| (row.chunk_id.as_str(), i)).collect();

    let mut seen: std::collections::HashSet<String> = primary.iter().map(|h| h.chunk_id.clone()).collect();
    let mut expanded = primary.to_vec();

    for hit in primary {
        let Some(&center) = index_by_chunk_id.get(hit.chunk_id.as_str()) else { continue };
        let lo = center.saturating_sub(window);
        let hi = (center + window).min(all_rows.len().saturating_sub(1));
        for idx in lo..=hi {
            if idx == center {
                continue;
            }
            let Some(neighbor) = all_rows.get(idx) else { continue };
            if neighbor.doc_id != hit.doc_id || !seen.insert(neighbor.chunk_id.clone()) {
                continue;
            }
            expanded.push(ChunkHit {
                score: hit.score - 1e-6,
                chunk_id: neighbor.chunk_id.clone(),
                doc_id: neighbor.doc_id.clone(),
                start_page: neighbor.start_page,
                end_page: neighbor.end_page,
                text: neighbor.text.clone(),
            });
        }
    }
    expanded
}

/// Assigns stable citation keys `c1..cN` in acceptance order and builds the
/// evidence block for the generator prompt.
#[must_use]
pub fn build_context_and_citations(evidence: &[ChunkHit]) -> (String, HashMap<String, Citation>) {
    let mut key_to_citation = HashMap::new();
    let mut blocks = Vec::new();

    for (i, hit) in evidence.iter().enumerate() {
        let key = format!("c{}", i + 1);
        key_to_citation.insert(
            key.clone(),
            Citation {
                key: key.clone(),
                doc_id: hit.doc_id.clone(),
                start_page: hit.start_page,
                end_page: hit.end_page,
                chunk_id: hit.chunk_id.clone(),
            },
        );
        blocks.push(format!(
            "[{key}] {} p{}-p{} chunk_id={}\n{}",
            hit.doc_id,
            hit.start_page,
            hit.end_page,
            hit.chunk_id,
            hit.text.trim()
        ));
    }

    (blocks.join("\n\n---\n\n"), key_to_citation)
}

/// Splits text into sentences on `[.?!]` followed by whitespace.
fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_BOUNDARY_RE
        .split(text.trim())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn extract_citation_keys(text: &str) -> std::collections::HashSet<String> {
    let mut keys = std::collections::HashSet::new();
    for group in CITE_GROUP_RE.captures_iter(text) {
        let inner = &group[1];
        for m in CITE_KEY_RE.find_iter(inner) {
            keys.insert(format!("c{}", &m.as_str()[1..]));
        }
    }
    keys
}

fn sentence_has_citation(sentence: &str) -> bool {
    CITE_GROUP_RE.captures_iter(sentence).any(|g| CITE_KEY_RE.is_match(&g[1]))
}

/// Validates raw generator output against the assigned citation keys,
/// enforcing that every sentence carries at least one recognized marker and
/// no unknown key is used. Normalizes to the canonical refusal on any
/// violation.
#[must_use]
pub fn enforce_inline_citations(answer_text: &str, key_to_citation: &HashMap<String, Citation>) -> AnswerResult {
    let trimmed = answer_text.trim();

    if refusal_variant(trimmed) {
        warn!(refusal_reason = "explicit_refusal", "citation enforcement refused");
        return AnswerResult::refusal();
    }

    let used = extract_citation_keys(trimmed);
    if used.is_empty() {
        warn!(refusal_reason = "no_citations", "citation enforcement refused");
        return AnswerResult::refusal();
    }

    if used.iter().any(|k| !key_to_citation.contains_key(k)) {
        warn!(refusal_reason = "unknown_citation_key", "citation enforcement refused");
        return AnswerResult::refusal();
    }

    for sentence in sentences(trimmed) {
        if !sentence_has_citation(sentence) {
            warn!(refusal_reason = "uncited_sentence", "citation enforcement refused");
            return AnswerResult::refusal();
        }
    }

    let mut used_sorted: Vec<&String> = used.iter().collect();
    used_sorted.sort_by_key(|k| k[1..].parse::<u64>().unwrap_or(u64::MAX));
    let citations: Vec<Citation> = used_sorted
        .into_iter()
        .filter_map(|k| key_to_citation.get(k).cloned())
        .collect();

    AnswerResult::accepted(trimmed.to_string(), citations)
}

fn build_prompt(question: &str, context: &str) -> String {
    format!(
        "You are a citation-grounded assistant. Answer ONLY using the evidence below.\n\
         Rules:\n\
         1) Every sentence MUST end with at least one inline citation marker like [c1].\n\
         2) You may ONLY use citation markers that appear in the evidence headers.\n\
         3) If the evidence is insufficient, reply exactly: {CANONICAL_REFUSAL}\n\
         4) Be concise and factual.\n\n\
         5) NEVER use information not in the provided evidence.\n\n\
         Question:\n{question}\n\n\
         Evidence:\n{context}\n"
    )
}

/// Orchestrates evidence selection, prompt construction, generation, and
/// citation validation, falling back to deterministic answers (algorithm
/// steps, comparison) when the generator refuses or fails validation.
///
/// # Errors
/// Propagates any error returned by `generate_fn`.
pub fn build_cited_answer(
    question: &str,
    hits: &[ChunkHit],
    settings: &Settings,
    generate_fn: impl Fn(&str) -> Result<String>,
) -> Result<AnswerResult> {
    let evidence = select_evidence(hits, settings);
    if evidence.len() < settings.min_evidence_hits {
        warn!(refusal_reason = "insufficient_evidence", evidence_count = evidence.len(), "citation enforcement refused");
        return Ok(AnswerResult::refusal());
    }

    let (context, key_to_citation) = build_context_and_citations(&evidence);
    let prompt = build_prompt(question, &context);

    let raw_answer = generate_fn(&prompt)?;
    let result = enforce_inline_citations(&raw_answer, &key_to_citation);
    if !result.is_refusal {
        return Ok(result);
    }

    if let Some(fallback) = algorithm_steps_fallback(question, &evidence, &key_to_citation) {
        let validated = enforce_inline_citations(&fallback, &key_to_citation);
        if !validated.is_refusal {
            return Ok(validated);
        }
    }
    if let Some(fallback) = comparison_fallback(question, &evidence, &key_to_citation) {
        let validated = enforce_inline_citations(&fallback, &key_to_citation);
        if !validated.is_refusal {
            return Ok(validated);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(chunk_id: &str, score: f64, text: &str) -> ChunkHit {
        ChunkHit {
            score,
            chunk_id: chunk_id.to_string(),
            doc_id: "d".to_string(),
            start_page: 1,
            end_page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn select_evidence_dedups_keeping_max_score() {
        let hits = vec![hit("c1", 0.1, "a"), hit("c1", 0.9, "a")];
        let evidence = select_evidence(&hits, &Settings::default());
        assert_eq!(evidence.len(), 1);
        assert!((evidence[0].score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn build_context_assigns_stable_keys_in_order() {
        let hits = vec![hit("c1", 0.9, "first"), hit("c2", 0.5, "second")];
        let (context, map) = build_context_and_citations(&hits);
        assert!(context.contains("[c1]"));
        assert!(context.contains("[c2]"));
        assert_eq!(map["c1"].chunk_id, "c1");
        assert_eq!(map["c2"].chunk_id, "c2");
    }

    #[test]
    fn uncited_sentence_causes_refusal() {
        let hits = vec![hit("c1", 0.9, "one"), hit("c2", 0.5, "two")];
        let (_, map) = build_context_and_citations(&hits);
        let result = enforce_inline_citations("First [c1]. Second has nothing.", &map);
        assert!(result.is_refusal);
        assert!(result.citations.is_empty());
    }

    #[test]
    fn unknown_key_causes_refusal() {
        let hits = vec![hit("c1", 0.9, "one")];
        let (_, map) = build_context_and_citations(&hits);
        let result = enforce_inline_citations("An answer [c99].", &map);
        assert!(result.is_refusal);
    }

    #[test]
    fn valid_answer_is_accepted_with_ordered_citations() {
        let hits = vec![hit("c1", 0.9, "one"), hit("c2", 0.5, "two")];
        let (_, map) = build_context_and_citations(&hits);
        let result = enforce_inline_citations("First fact [c2]. Second fact [c1].", &map);
        assert!(!result.is_refusal);
        assert_eq!(result.citations.len(), 2);
        assert_eq!(result.citations[0].key, "c1");
    }

    #[test]
    fn explicit_refusal_text_normalizes_to_canonical() {
        let map = HashMap::new();
        let result = enforce_inline_citations("Not Found", &map);
        assert!(result.is_refusal);
        assert_eq!(result.answer_text, CANONICAL_REFUSAL);
    }

    #[test]
    fn min_evidence_hits_refuses_without_calling_generator() {
        let mut settings = Settings::default();
        settings.min_evidence_hits = 2;
        let hits = vec![hit("c1", 0.9, "only one")];
        let result = build_cited_answer("q", &hits, &settings, |_| {
            panic!("generator must not be called")
        })
        .expect("no error");
        assert!(result.is_refusal);
    }
}
