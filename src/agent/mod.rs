//! Bounded retrieve-assess-refine agent loop (C8).
//!
//! Grounded on `original_source/rag/lc/graph.py` (node topology, budgets,
//! the heuristic router in `_heuristic_route`, the assessment/refinement
//! shape) and `rag/lc/tools.py` (the per-action query shaping for
//! `retrieve`/`resolve_definition`/`compare`). The teacher's dynamic
//! `importlib`-based tool dispatch (`_find_retrieve_entrypoint`,
//! `_call_with_flexible_signature`) is not carried over: this crate wires
//! the retriever and generator as plain function parameters instead of
//! runtime-resolved, flexibly-signed imports.

use crate::bm25::Bm25Artifact;
use crate::citation::build_cited_answer;
use crate::config::Settings;
use crate::core::{AgentState, ChunkHit, Plan, PlanAction, RefusalReason, StopReason};
use crate::fusion::hybrid_search;
use crate::store::LoadedStore;
use crate::vector::VectorIndex;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{info, warn};

static ANCHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(algorithm\s+\d+|table\s+\d+|section\s+\d+(?:\.\d+)*)\b").expect("valid regex"));
static COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:differences?\s+between\s+(.+?)\s+and\s+(.+)|compare\s+(.+?)\s+and\s+(.+)|(.+?)\s+vs\.?\s+(.+))")
        .expect("valid regex")
});

const DOMAIN_ANCHOR_KEYWORDS: &[&str] = &["keygen", "encaps", "decaps", "shake128", "shake256", "xof"];

fn extract_question_anchors(question: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut anchors: Vec<String> = ANCHOR_RE
        .find_iter(question)
        .map(|m| m.as_str().to_lowercase())
        .filter(|a| seen.insert(a.clone()))
        .collect();
    let lowered = question.to_lowercase();
    for keyword in DOMAIN_ANCHOR_KEYWORDS {
        if lowered.contains(keyword) && seen.insert((*keyword).to_string()) {
            anchors.push((*keyword).to_string());
        }
    }
    anchors
}

fn compare_topics(question: &str) -> Option<(String, String)> {
    let caps = COMPARE_RE.captures(question)?;
    (1..=5)
        .step_by(2)
        .find_map(|i| Some((caps.get(i)?.as_str().trim().to_string(), caps.get(i + 1)?.as_str().trim().to_string())))
}

fn is_compare_question(lowered: &str) -> bool {
    lowered.contains("compare") || lowered.contains("difference between") || lowered.contains(" vs ") || lowered.contains("versus")
}

fn definition_term(question: &str) -> String {
    question
        .splitn(3, ' ')
        .last()
        .unwrap_or(question)
        .trim_matches(|c: char| c == '?' || c == '.' || c.is_whitespace())
        .to_string()
}

/// Heuristically classifies `question` into a `Plan`, with no LLM call.
///
/// Order of precedence: comparison intent, algorithm/SHAKE intent,
/// definition intent, default retrieval.
#[must_use]
pub fn heuristic_route(question: &str) -> Plan {
    let trimmed = question.trim();
    let lowered = trimmed.to_lowercase();

    if is_compare_question(&lowered) {
        let mut args = HashMap::new();
        let (topic_a, topic_b) = compare_topics(trimmed).unwrap_or_else(|| (trimmed.to_string(), trimmed.to_string()));
        args.insert("topic_a".to_string(), topic_a);
        args.insert("topic_b".to_string(), topic_b);
        return Plan {
            action: PlanAction::Compare,
            reason: "comparison intent detected".to_string(),
            query: None,
            args,
            mode_hint: Some("general".to_string()),
        };
    }

    if lowered.contains("algorithm") || lowered.contains("shake") {
        return Plan {
            action: PlanAction::Retrieve,
            reason: "algorithm-like query detected; retrieve evidence".to_string(),
            query: Some(trimmed.to_string()),
            args: HashMap::new(),
            mode_hint: Some("algorithm".to_string()),
        };
    }

    if lowered.starts_with("what is") || lowered.starts_with("what's") || lowered.starts_with("define") || lowered.starts_with("explain")
    {
        let mut args = HashMap::new();
        args.insert("term".to_string(), definition_term(trimmed));
        return Plan {
            action: PlanAction::ResolveDefinition,
            reason: "definition intent detected".to_string(),
            query: None,
            args,
            mode_hint: Some("definition".to_string()),
        };
    }

    Plan {
        action: PlanAction::Retrieve,
        reason: "default to retrieval".to_string(),
        query: Some(trimmed.to_string()),
        args: HashMap::new(),
        mode_hint: Some("general".to_string()),
    }
}

/// Runs the retrieval action implied by `plan`, shaping the query per
/// action as `tools.py`'s `retrieve`/`resolve_definition`/`compare` do.
#[allow(clippy::too_many_arguments)]
fn retrieve_for_plan(
    plan: &Plan,
    question: &str,
    index: &dyn VectorIndex,
    store: &LoadedStore,
    bm25: &Bm25Artifact,
    embed_query: &impl Fn(&str) -> Option<Vec<f32>>,
    settings: &Settings,
) -> Vec<ChunkHit> {
    match plan.action {
        PlanAction::Retrieve => {
            let query = plan.query.clone().unwrap_or_else(|| question.to_string());
            hybrid_search(&query, index, store, bm25, embed_query, settings)
        }
        PlanAction::ResolveDefinition => {
            let term = plan.args.get("term").cloned().unwrap_or_else(|| question.to_string());
            let query = format!("definition of {term}; notation; definitions");
            hybrid_search(&query, index, store, bm25, embed_query, settings)
        }
        PlanAction::Compare => {
            let topic_a = plan.args.get("topic_a").cloned().unwrap_or_else(|| question.to_string());
            let topic_b = plan.args.get("topic_b").cloned().unwrap_or_else(|| question.to_string());
            let qa = format!("{topic_a} intended use-cases; definition; key properties");
            let qb = format!("{topic_b} intended use-cases; definition; key properties");
            let mut hits = hybrid_search(&qa, index, store, bm25, embed_query, settings);
            hits.extend(hybrid_search(&qb, index, store, bm25, embed_query, settings));
            hits
        }
        PlanAction::Answer => Vec::new(),
    }
}

/// Three-rule sufficiency check, in priority order: `insufficient_hits`,
/// `anchor_missing`, `compare_doc_diversity_missing`.
fn assess_evidence(question: &str, plan: &Plan, evidence: &[ChunkHit], settings: &Settings) -> (bool, Option<StopReason>) {
    if evidence.len() < settings.min_evidence_hits {
        return (false, Some(StopReason::InsufficientHits));
    }

    let anchors = extract_question_anchors(question);
    if !anchors.is_empty() {
        let covered = anchors.iter().any(|a| evidence.iter().any(|hit| hit.text.to_lowercase().contains(a.as_str())));
        if !covered {
            return (false, Some(StopReason::AnchorMissing));
        }
    }

    if plan.action == PlanAction::Compare {
        let docs: HashSet<&str> = evidence.iter().map(|hit| hit.doc_id.as_str()).collect();
        if docs.len() < 2 {
            return (false, Some(StopReason::CompareDocDiversityMissing));
        }
    }

    (true, None)
}

fn budget_exhausted(state: &AgentState, settings: &Settings) -> Option<StopReason> {
    if state.counters.steps >= settings.agent_max_steps {
        return Some(StopReason::StepBudgetExhausted);
    }
    if state.counters.tool_calls >= settings.agent_max_tool_calls {
        return Some(StopReason::ToolBudgetExhausted);
    }
    if state.counters.retrieval_round >= settings.agent_max_retrieval_rounds {
        return Some(StopReason::RetrievalRoundBudgetExhausted);
    }
    None
}

/// Produces the next round's plan from the previous one, per the reason
/// evidence was judged insufficient.
fn refine_plan(plan: &Plan, question: &str, reason: StopReason) -> Plan {
    match reason {
        StopReason::AnchorMissing => {
            let anchors = extract_question_anchors(question);
            let base = plan.query.clone().unwrap_or_else(|| question.to_string());
            let appended = format!("{base} {}", anchors.join(" "));
            Plan { query: Some(appended.trim().to_string()), ..plan.clone() }
        }
        StopReason::CompareDocDiversityMissing => {
            let topic_a = plan.args.get("topic_a").cloned().unwrap_or_default();
            let topic_b = plan.args.get("topic_b").cloned().unwrap_or_default();
            let mut args = plan.args.clone();
            args.insert("topic_a".to_string(), format!("{topic_a} intended use-cases; definition; key properties"));
            args.insert("topic_b".to_string(), format!("{topic_b} intended use-cases; definition; key properties"));
            Plan { args, ..plan.clone() }
        }
        StopReason::InsufficientHits if plan.action == PlanAction::ResolveDefinition => {
            let term = plan.args.get("term").cloned().unwrap_or_else(|| question.to_string());
            Plan { query: Some(format!("definition of {term}; notation; section")), ..plan.clone() }
        }
        StopReason::InsufficientHits => {
            let base = plan.query.clone().unwrap_or_else(|| question.to_string());
            Plan { query: Some(format!("{base} section algorithm definition")), ..plan.clone() }
        }
        StopReason::SufficientEvidence
        | StopReason::StepBudgetExhausted
        | StopReason::ToolBudgetExhausted
        | StopReason::RetrievalRoundBudgetExhausted => plan.clone(),
    }
}

fn finalize(state: &mut AgentState) {
    let refusal_reason = if state.stop_reason != Some(StopReason::SufficientEvidence) {
        state.stop_reason.map(RefusalReason::Stop)
    } else if state.draft_answer.as_deref().map_or(true, |d| d.trim().is_empty()) {
        Some(RefusalReason::EmptyDraftAnswer)
    } else if state.evidence.is_empty() {
        Some(RefusalReason::EmptyEvidence)
    } else if state.citations.is_empty() {
        Some(RefusalReason::MissingCitations)
    } else {
        None
    };

    match refusal_reason {
        Some(reason) => {
            state.refusal_reason = Some(reason);
            state.final_answer = Some(reason.message());
            state.citations.clear();
        }
        None => state.final_answer = state.draft_answer.clone(),
    }
}

/// Runs the bounded retrieve-assess-refine-answer loop for `question`,
/// returning the final `AgentState` (inspect `final_answer`, `citations`,
/// `refusal_reason`, `trace`).
#[allow(clippy::too_many_arguments)]
pub fn run_agent(
    question: &str,
    index: &dyn VectorIndex,
    store: &LoadedStore,
    bm25: &Bm25Artifact,
    embed_query: impl Fn(&str) -> Option<Vec<f32>>,
    generate_fn: impl Fn(&str) -> crate::error::Result<String>,
    settings: &Settings,
) -> AgentState {
    let mut state = AgentState::new(question.to_string());

    state.enter_node("route");
    let mut plan = heuristic_route(question);
    info!(step = state.counters.steps, node = "route", action = ?plan.action, "agent step");

    loop {
        if plan.action == PlanAction::Answer {
            break;
        }

        if let Some(reason) = budget_exhausted(&state, settings) {
            warn!(reason = reason.as_str(), counters = ?state.counters, "agent budget exhausted");
            state.stop_reason = Some(reason);
            break;
        }

        state.enter_node("retrieve");
        state.counters.tool_calls += 1;
        state.counters.retrieval_round += 1;
        let hits = retrieve_for_plan(&plan, question, index, store, bm25, &embed_query, settings);
        state.merge_evidence(hits);
        info!(step = state.counters.steps, node = "retrieve", evidence_count = state.evidence.len(), "agent step");

        state.enter_node("assess_evidence");
        let (sufficient, reason) = assess_evidence(question, &plan, &state.evidence, settings);
        state.evidence_sufficient = sufficient;
        info!(step = state.counters.steps, node = "assess_evidence", sufficient, "agent step");
        if sufficient {
            state.stop_reason = Some(StopReason::SufficientEvidence);
            break;
        }

        let assessment_reason = reason.expect("assess_evidence returns a reason when insufficient");
        if let Some(budget_reason) = budget_exhausted(&state, settings) {
            warn!(reason = budget_reason.as_str(), counters = ?state.counters, "agent budget exhausted");
            state.stop_reason = Some(budget_reason);
            break;
        }
        state.stop_reason = Some(assessment_reason);

        state.enter_node("refine_query");
        info!(step = state.counters.steps, node = "refine_query", reason = assessment_reason.as_str(), "agent step");
        plan = refine_plan(&plan, question, assessment_reason);
    }

    state.plan = Some(plan);

    state.enter_node("answer");
    if state.stop_reason == Some(StopReason::SufficientEvidence) {
        match build_cited_answer(question, &state.evidence, settings, &generate_fn) {
            Ok(result) => {
                state.draft_answer = Some(result.answer_text);
                state.citations = result.citations;
            }
            Err(_) => state.draft_answer = None,
        }
    }

    state.enter_node("verify_or_refuse");
    finalize(&mut state);
    if let Some(reason) = state.refusal_reason {
        warn!(reason = reason.as_str(), "agent refused to answer");
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Chunk;
    use crate::embedding::{Embedder, FallbackEmbedder};
    use crate::store::{build_store, persist_store};
    use crate::vector::BruteForceIndex;

    fn hit(doc_id: &str, page: u32, chunk_id: &str, text: &str) -> ChunkHit {
        ChunkHit { score: 1.0, chunk_id: chunk_id.to_string(), doc_id: doc_id.to_string(), start_page: page, end_page: page, text: text.to_string() }
    }

    #[test]
    fn routes_comparison_intent() {
        let plan = heuristic_route("Compare ML-KEM and ML-DSA");
        assert_eq!(plan.action, PlanAction::Compare);
        assert_eq!(plan.args.get("topic_a").map(String::as_str), Some("ML-KEM"));
        assert_eq!(plan.args.get("topic_b").map(String::as_str), Some("ML-DSA"));
    }

    #[test]
    fn routes_algorithm_intent() {
        let plan = heuristic_route("What does Algorithm 19 do?");
        assert_eq!(plan.action, PlanAction::Retrieve);
        assert_eq!(plan.mode_hint.as_deref(), Some("algorithm"));
    }

    #[test]
    fn routes_definition_intent() {
        let plan = heuristic_route("What is ML-KEM?");
        assert_eq!(plan.action, PlanAction::ResolveDefinition);
        assert_eq!(plan.args.get("term").map(String::as_str), Some("ML-KEM?").map(|_| "ML-KEM"));
    }

    #[test]
    fn routes_default_to_retrieve() {
        let plan = heuristic_route("tell me about hashing");
        assert_eq!(plan.action, PlanAction::Retrieve);
        assert_eq!(plan.mode_hint.as_deref(), Some("general"));
    }

    #[test]
    fn assess_evidence_flags_insufficient_hits() {
        let settings = Settings { min_evidence_hits: 2, ..Settings::default() };
        let evidence = vec![hit("d", 1, "c1", "alpha")];
        let plan = Plan::retrieve("q".to_string(), "r");
        let (sufficient, reason) = assess_evidence("q", &plan, &evidence, &settings);
        assert!(!sufficient);
        assert_eq!(reason, Some(StopReason::InsufficientHits));
    }

    #[test]
    fn assess_evidence_flags_anchor_missing() {
        let settings = Settings { min_evidence_hits: 1, ..Settings::default() };
        let evidence = vec![hit("d", 1, "c1", "unrelated text")];
        let plan = Plan::retrieve("q".to_string(), "r");
        let (sufficient, reason) = assess_evidence("Describe Algorithm 19", &plan, &evidence, &settings);
        assert!(!sufficient);
        assert_eq!(reason, Some(StopReason::AnchorMissing));
    }

    #[test]
    fn assess_evidence_flags_compare_doc_diversity_missing() {
        let settings = Settings { min_evidence_hits: 1, ..Settings::default() };
        let evidence = vec![hit("d", 1, "c1", "alpha"), hit("d", 2, "c2", "beta")];
        let mut plan = Plan::retrieve("q".to_string(), "r");
        plan.action = PlanAction::Compare;
        let (sufficient, reason) = assess_evidence("Compare A and B", &plan, &evidence, &settings);
        assert!(!sufficient);
        assert_eq!(reason, Some(StopReason::CompareDocDiversityMissing));
    }

    #[test]
    fn assess_evidence_sufficient_when_all_rules_pass() {
        let settings = Settings { min_evidence_hits: 1, ..Settings::default() };
        let evidence = vec![hit("d", 1, "c1", "alpha beta")];
        let plan = Plan::retrieve("q".to_string(), "r");
        let (sufficient, reason) = assess_evidence("tell me about alpha", &plan, &evidence, &settings);
        assert!(sufficient);
        assert_eq!(reason, None);
    }

    #[test]
    fn refine_plan_appends_anchors_on_anchor_missing() {
        let plan = Plan::retrieve("shake".to_string(), "r");
        let refined = refine_plan(&plan, "Describe Algorithm 19 keygen", StopReason::AnchorMissing);
        let query = refined.query.expect("query set");
        assert!(query.contains("algorithm 19"));
        assert!(query.contains("keygen"));
    }

    #[test]
    fn refine_plan_uses_definition_phrasing_for_insufficient_hits() {
        let mut plan = Plan::retrieve("q".to_string(), "r");
        plan.action = PlanAction::ResolveDefinition;
        plan.args.insert("term".to_string(), "ML-KEM".to_string());
        let refined = refine_plan(&plan, "q", StopReason::InsufficientHits);
        assert_eq!(refined.query.as_deref(), Some("definition of ML-KEM; notation; section"));
    }

    fn setup_index() -> (tempfile::TempDir, LoadedStore, Bm25Artifact) {
        let chunks = vec![
            Chunk::new(
                "d::p0001::c000".to_string(),
                "d".to_string(),
                1,
                1,
                "Algorithm 19: ML-KEM.KeyGen\n1: Generate random seed d\n2: Derive keys".to_string(),
            ),
            Chunk::new("d::p0002::c000".to_string(), "d".to_string(), 2, 2, "unrelated filler content about nothing".to_string()),
        ];
        let (texts, rows) = build_store(&chunks);
        let embedder = FallbackEmbedder::new(16);
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let vectors = embedder.embed_batch(&refs).expect("embed");
        let dir = tempfile::tempdir().expect("tempdir");
        persist_store(dir.path(), &rows, &vectors, "test").expect("persist");
        let store = LoadedStore::load(dir.path()).expect("load");
        let bm25 = Bm25Artifact::build(&rows, crate::bm25::Bm25Params::default());
        (dir, store, bm25)
    }

    #[test]
    fn run_agent_produces_cited_answer_when_evidence_sufficient() {
        let (_dir, store, bm25) = setup_index();
        let index = BruteForceIndex::new(&store);
        let embedder = FallbackEmbedder::new(16);
        let settings = Settings { min_evidence_hits: 1, agent_max_steps: 8, agent_max_tool_calls: 4, agent_max_retrieval_rounds: 3, ..Settings::default() };

        let embed_query = |q: &str| embedder.embed(q).ok();
        let generate_fn = |_prompt: &str| Ok("ML-KEM.KeyGen generates a key pair [c1].".to_string());

        let state = run_agent("What does Algorithm 19 ML-KEM.KeyGen do?", &index, &store, &bm25, embed_query, generate_fn, &settings);
        assert_eq!(state.stop_reason, Some(StopReason::SufficientEvidence));
        assert!(state.refusal_reason.is_none());
        assert!(state.final_answer.is_some());
        assert!(!state.citations.is_empty());
    }

    #[test]
    fn run_agent_refuses_when_no_evidence_matches() {
        let (_dir, store, bm25) = setup_index();
        let index = BruteForceIndex::new(&store);
        let embedder = FallbackEmbedder::new(16);
        let settings = Settings { min_evidence_hits: 50, agent_max_steps: 4, agent_max_tool_calls: 2, agent_max_retrieval_rounds: 2, ..Settings::default() };

        let embed_query = |q: &str| embedder.embed(q).ok();
        let generate_fn = |_prompt: &str| Ok("anything".to_string());

        let state = run_agent("what is quantum gravity", &index, &store, &bm25, embed_query, generate_fn, &settings);
        assert!(state.refusal_reason.is_some());
        assert_eq!(state.citations.len(), 0);
        assert_eq!(state.final_answer.as_deref().map(|s| s.contains("not found in provided docs")), Some(true));
    }
}
