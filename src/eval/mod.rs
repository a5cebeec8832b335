//! Evaluator (C9): retrieval and citation-compliance metrics over a labeled
//! question set.
//!
//! Grounded on `SPEC_FULL.md` ?4.9 directly (no direct retrieved evaluation
//! harness in the source pack); output-artifact style (JSONL + summary JSON)
//! follows the teacher's `cli::output`/`cli::commands::cmd_export_buffers`
//! JSON-serialization convention.

use crate::core::{AnswerResult, ChunkHit, CANONICAL_REFUSAL};
use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A gold evidence span: one document and an inclusive page range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldSpan {
    /// Document identifier the gold span belongs to.
    pub doc_id: String,
    /// Start page (inclusive).
    pub start_page: u32,
    /// End page (inclusive).
    pub end_page: u32,
}

/// One labeled evaluation question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledQuestion {
    /// Question identifier, compared in numeric-aware order (`q2 < q10`).
    pub qid: String,
    /// The question text.
    pub question: String,
    /// Whether the corpus actually contains an answer to this question.
    pub answerable: bool,
    /// Gold evidence spans; empty for `answerable == false` questions.
    pub gold: Vec<GoldSpan>,
}

/// Per-question retrieval and (optional) answer-compliance metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionMetrics {
    /// Question identifier this record belongs to.
    pub qid: String,
    /// Recall@k: fraction of gold spans matched by the top-k hits.
    pub recall_at_k: Option<f64>,
    /// MRR@k: reciprocal rank of the first matching hit, 0 if none.
    pub mrr_at_k: Option<f64>,
    /// nDCG@k with binary, unique-gold-accounted gains.
    pub ndcg_at_k: Option<f64>,
    /// Recall@k ignoring page ranges (`doc_id` match only).
    pub doc_only_recall_at_k: Option<f64>,
    /// Recall@k with gold spans widened by the configured page tolerance.
    pub near_page_recall_at_k: Option<f64>,
    /// For `answerable == false` questions: whether the system refused.
    pub refused_correctly: Option<bool>,
    /// For accepted answers on answerable questions: whether every citation
    /// grounds in a gold span.
    pub citations_grounded: Option<bool>,
}

/// Aggregate metrics over a full run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    /// Cutoff used for every `@k` metric.
    pub k: usize,
    /// Number of questions marked `answerable`.
    pub n_answerable: usize,
    /// Number of questions marked not answerable.
    pub n_unanswerable: usize,
    /// Mean Recall@k over answerable questions.
    pub mean_recall_at_k: f64,
    /// Mean MRR@k over answerable questions.
    pub mean_mrr_at_k: f64,
    /// Mean nDCG@k over answerable questions.
    pub mean_ndcg_at_k: f64,
    /// Mean doc-only Recall@k over answerable questions.
    pub mean_doc_only_recall_at_k: f64,
    /// Mean near-page Recall@k over answerable questions.
    pub mean_near_page_recall_at_k: f64,
    /// Fraction of unanswerable questions the system correctly refused.
    pub refusal_accuracy: Option<f64>,
    /// Fraction of accepted answers on answerable questions whose citations
    /// all ground in a gold span.
    pub citation_compliance: Option<f64>,
    /// Per-question metric records, in the `qid` order they were evaluated.
    pub per_question: Vec<QuestionMetrics>,
}

/// Natural (numeric-aware) string comparison: digit runs compare by value,
/// so `"q2" < "q10"`.
#[must_use]
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ac = a.chars().peekable();
    let mut bc = b.chars().peekable();
    loop {
        match (ac.peek().copied(), bc.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let mut na = String::new();
                    while let Some(&c) = ac.peek() {
                        if c.is_ascii_digit() {
                            na.push(c);
                            ac.next();
                        } else {
                            break;
                        }
                    }
                    let mut nb = String::new();
                    while let Some(&c) = bc.peek() {
                        if c.is_ascii_digit() {
                            nb.push(c);
                            bc.next();
                        } else {
                            break;
                        }
                    }
                    let va: u64 = na.parse().unwrap_or(0);
                    let vb: u64 = nb.parse().unwrap_or(0);
                    match va.cmp(&vb) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    ac.next();
                    bc.next();
                    match ca.cmp(&cb) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
            }
        }
    }
}

fn pages_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    a_start <= b_end && b_start <= a_end
}

fn hit_matches_gold(hit: &ChunkHit, gold: &GoldSpan, doc_only: bool, tolerance: u32) -> bool {
    if hit.doc_id != gold.doc_id {
        return false;
    }
    if doc_only {
        return true;
    }
    let widened_start = gold.start_page.saturating_sub(tolerance);
    let widened_end = gold.end_page + tolerance;
    pages_overlap(hit.start_page, hit.end_page, widened_start, widened_end)
}

fn recall_at_k(hits: &[ChunkHit], gold: &[GoldSpan], k: usize, doc_only: bool, tolerance: u32) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let top_k = &hits[..hits.len().min(k)];
    let covered = gold.iter().filter(|g| top_k.iter().any(|h| hit_matches_gold(h, g, doc_only, tolerance))).count();
    #[allow(clippy::cast_precision_loss)]
    let frac = covered as f64 / gold.len() as f64;
    frac
}

fn mrr_at_k(hits: &[ChunkHit], gold: &[GoldSpan], k: usize) -> f64 {
    let top_k = &hits[..hits.len().min(k)];
    for (i, hit) in top_k.iter().enumerate() {
        if gold.iter().any(|g| hit_matches_gold(hit, g, false, 0)) {
            #[allow(clippy::cast_precision_loss)]
            return 1.0 / (i + 1) as f64;
        }
    }
    0.0
}

fn ndcg_at_k(hits: &[ChunkHit], gold: &[GoldSpan], k: usize) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let top_k = &hits[..hits.len().min(k)];
    let mut matched_gold: HashSet<usize> = HashSet::new();
    let mut dcg = 0.0;
    for (i, hit) in top_k.iter().enumerate() {
        let rank = i + 1;
        let first_unmatched = gold.iter().enumerate().find(|(gi, g)| !matched_gold.contains(gi) && hit_matches_gold(hit, g, false, 0));
        if let Some((gi, _)) = first_unmatched {
            matched_gold.insert(gi);
            #[allow(clippy::cast_precision_loss)]
            let gain = 1.0 / f64::log2((rank + 1) as f64);
            dcg += gain;
        }
    }
    let ideal_count = gold.len().min(k);
    let ideal_dcg: f64 = (1..=ideal_count).map(|rank| 1.0 / f64::log2((rank + 1) as f64)).sum();
    if ideal_dcg == 0.0 {
        0.0
    } else {
        dcg / ideal_dcg
    }
}

/// Computes full retrieval and citation-compliance metrics for `questions`
/// against `hits_by_qid` (already-retrieved top-k-or-more hits per
/// question) and, optionally, `answers_by_qid` (the agent's/answerer's
/// final `AnswerResult` per question, for refusal-accuracy and citation-
/// compliance diagnostics).
///
/// Questions are processed in numeric-aware `qid` order.
///
/// # Errors
/// Returns `Error::Eval(EmptyQuestionSet)` if `questions` is empty.
pub fn evaluate(
    questions: &[LabeledQuestion],
    hits_by_qid: &HashMap<String, Vec<ChunkHit>>,
    answers_by_qid: Option<&HashMap<String, AnswerResult>>,
    k: usize,
    page_tolerance: u32,
) -> Result<EvalSummary> {
    if questions.is_empty() {
        return Err(EvalError::EmptyQuestionSet.into());
    }

    let mut ordered: Vec<&LabeledQuestion> = questions.iter().collect();
    ordered.sort_by(|a, b| natural_cmp(&a.qid, &b.qid));

    let mut per_question = Vec::with_capacity(ordered.len());
    let (mut sum_recall, mut sum_mrr, mut sum_ndcg, mut sum_doc_only, mut sum_near_page) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let mut n_answerable = 0usize;
    let mut n_unanswerable = 0usize;
    let (mut refused_correct, mut refusal_checked) = (0usize, 0usize);
    let (mut grounded_correct, mut grounded_checked) = (0usize, 0usize);

    for question in ordered {
        let empty: Vec<ChunkHit> = Vec::new();
        let hits = hits_by_qid.get(&question.qid).unwrap_or(&empty);
        let answer = answers_by_qid.and_then(|m| m.get(&question.qid));

        if question.answerable {
            n_answerable += 1;
            let recall = recall_at_k(hits, &question.gold, k, false, 0);
            let mrr = mrr_at_k(hits, &question.gold, k);
            let ndcg = ndcg_at_k(hits, &question.gold, k);
            let doc_only = recall_at_k(hits, &question.gold, k, true, 0);
            let near_page = recall_at_k(hits, &question.gold, k, false, page_tolerance);

            sum_recall += recall;
            sum_mrr += mrr;
            sum_ndcg += ndcg;
            sum_doc_only += doc_only;
            sum_near_page += near_page;

            let citations_grounded = answer.filter(|a| !a.is_refusal).map(|a| {
                grounded_checked += 1;
                let grounded = a
                    .citations
                    .iter()
                    .all(|c| question.gold.iter().any(|g| g.doc_id == c.doc_id && pages_overlap(c.start_page, c.end_page, g.start_page, g.end_page)));
                if grounded {
                    grounded_correct += 1;
                }
                grounded
            });

            per_question.push(QuestionMetrics {
                qid: question.qid.clone(),
                recall_at_k: Some(recall),
                mrr_at_k: Some(mrr),
                ndcg_at_k: Some(ndcg),
                doc_only_recall_at_k: Some(doc_only),
                near_page_recall_at_k: Some(near_page),
                refused_correctly: None,
                citations_grounded,
            });
        } else {
            n_unanswerable += 1;
            let refused_correctly = answer.map(|a| {
                refusal_checked += 1;
                let correct = a.is_refusal && a.answer_text.eq_ignore_ascii_case(CANONICAL_REFUSAL);
                if correct {
                    refused_correct += 1;
                }
                correct
            });

            per_question.push(QuestionMetrics {
                qid: question.qid.clone(),
                recall_at_k: None,
                mrr_at_k: None,
                ndcg_at_k: None,
                doc_only_recall_at_k: None,
                near_page_recall_at_k: None,
                refused_correctly,
                citations_grounded: None,
            });
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let denom = n_answerable.max(1) as f64;
    let mean = |sum: f64| if n_answerable == 0 { 0.0 } else { sum / denom };

    #[allow(clippy::cast_precision_loss)]
    let refusal_accuracy = (refusal_checked > 0).then(|| refused_correct as f64 / refusal_checked as f64);
    #[allow(clippy::cast_precision_loss)]
    let citation_compliance = (grounded_checked > 0).then(|| grounded_correct as f64 / grounded_checked as f64);

    Ok(EvalSummary {
        k,
        n_answerable,
        n_unanswerable,
        mean_recall_at_k: mean(sum_recall),
        mean_mrr_at_k: mean(sum_mrr),
        mean_ndcg_at_k: mean(sum_ndcg),
        mean_doc_only_recall_at_k: mean(sum_doc_only),
        mean_near_page_recall_at_k: mean(sum_near_page),
        refusal_accuracy,
        citation_compliance,
        per_question,
    })
}

/// Writes `summary.per_question` as JSONL, plus a summary JSON and a short
/// Markdown report, into `out_dir`.
///
/// # Errors
/// Returns `Error::Io` on any filesystem failure.
pub fn write_eval_artifacts(summary: &EvalSummary, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;

    let jsonl_path = out_dir.join("eval_results.jsonl");
    let mut lines = Vec::with_capacity(summary.per_question.len());
    for record in &summary.per_question {
        lines.push(serde_json::to_string(record)?);
    }
    std::fs::write(jsonl_path, lines.join("\n") + "\n")?;

    let summary_json_path = out_dir.join("eval_summary.json");
    std::fs::write(summary_json_path, serde_json::to_string_pretty(summary)?)?;

    let summary_md_path = out_dir.join("eval_summary.md");
    let mut md = String::new();
    md.push_str("# Evaluation summary\n\n");
    md.push_str(&format!("- k = {}\n", summary.k));
    md.push_str(&format!("- answerable questions: {}\n", summary.n_answerable));
    md.push_str(&format!("- unanswerable questions: {}\n", summary.n_unanswerable));
    md.push_str(&format!("- mean Recall@k: {:.4}\n", summary.mean_recall_at_k));
    md.push_str(&format!("- mean MRR@k: {:.4}\n", summary.mean_mrr_at_k));
    md.push_str(&format!("- mean nDCG@k: {:.4}\n", summary.mean_ndcg_at_k));
    md.push_str(&format!("- mean doc-only Recall@k: {:.4}\n", summary.mean_doc_only_recall_at_k));
    md.push_str(&format!("- mean near-page Recall@k: {:.4}\n", summary.mean_near_page_recall_at_k));
    if let Some(r) = summary.refusal_accuracy {
        md.push_str(&format!("- refusal accuracy: {r:.4}\n"));
    }
    if let Some(c) = summary.citation_compliance {
        md.push_str(&format!("- citation compliance: {c:.4}\n"));
    }
    std::fs::write(summary_md_path, md)?;

    Ok(())
}
