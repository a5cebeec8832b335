//! Agent loop state: plans, stop/refusal reasons, and the per-query record.

use super::hit::{Citation, ChunkHit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The router's classification of a question, and the retrieval action it
/// implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanAction {
    /// A plain retrieval using the question (or a refined query) verbatim.
    Retrieve,
    /// A two-topic comparison retrieval.
    Compare,
    /// A definition-lookup retrieval.
    ResolveDefinition,
    /// Skip retrieval and answer directly (rare; reserved for future router
    /// extensions, never emitted by the current heuristic router).
    Answer,
}

/// The router's output: what to do next, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// The chosen action.
    pub action: PlanAction,
    /// Human-readable reason the router chose this action.
    pub reason: String,
    /// The query to retrieve with, when `action` needs one.
    pub query: Option<String>,
    /// Action-specific arguments (e.g. the two topics for `Compare`).
    pub args: HashMap<String, String>,
    /// An optional hint threaded through to retrieval mode selection.
    pub mode_hint: Option<String>,
}

impl Plan {
    /// Builds a plain retrieval plan for `query`.
    #[must_use]
    pub fn retrieve(query: String, reason: impl Into<String>) -> Self {
        Self {
            action: PlanAction::Retrieve,
            reason: reason.into(),
            query: Some(query),
            args: HashMap::new(),
            mode_hint: None,
        }
    }
}

/// Why the agent loop stopped retrieving/refining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Assessment found the evidence sufficient.
    SufficientEvidence,
    /// Fewer than `min_evidence_hits` accepted chunks.
    InsufficientHits,
    /// The question named an anchor no evidence text contains.
    AnchorMissing,
    /// A comparison question whose evidence spans fewer than 2 documents.
    CompareDocDiversityMissing,
    /// `max_steps` was reached.
    StepBudgetExhausted,
    /// `max_tool_calls` was reached.
    ToolBudgetExhausted,
    /// `max_retrieval_rounds` was reached.
    RetrievalRoundBudgetExhausted,
}

impl StopReason {
    /// The wire/trace name used in logs and the eval harness.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SufficientEvidence => "sufficient_evidence",
            Self::InsufficientHits => "insufficient_hits",
            Self::AnchorMissing => "anchor_missing",
            Self::CompareDocDiversityMissing => "compare_doc_diversity_missing",
            Self::StepBudgetExhausted => "step_budget_exhausted",
            Self::ToolBudgetExhausted => "tool_budget_exhausted",
            Self::RetrievalRoundBudgetExhausted => "retrieval_round_budget_exhausted",
        }
    }
}

/// Why the controller ultimately refused to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefusalReason {
    /// Mirrors a non-sufficient `StopReason`.
    Stop(StopReason),
    /// The generator produced an empty or wholly invalid draft.
    EmptyDraftAnswer,
    /// No evidence was available at answer time.
    EmptyEvidence,
    /// The draft contained zero citations.
    MissingCitations,
}

impl RefusalReason {
    /// The wire/trace name, matching `StopReason::as_str` for the `Stop`
    /// variant.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stop(reason) => reason.as_str(),
            Self::EmptyDraftAnswer => "empty_draft_answer",
            Self::EmptyEvidence => "empty_evidence",
            Self::MissingCitations => "missing_citations",
        }
    }

    /// A human-readable refusal message parameterized by reason.
    #[must_use]
    pub fn message(self) -> String {
        format!(
            "not found in provided docs (reason: {})",
            self.as_str()
        )
    }
}

/// Monotonically non-decreasing counters tracked across the agent loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCounters {
    /// Total node transitions.
    pub steps: u32,
    /// Total retrieval invocations.
    pub tool_calls: u32,
    /// Total retrieve->assess cycles.
    pub retrieval_round: u32,
}

/// The full per-query agent record. Discarded after the final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// The original question.
    pub question: String,
    /// The router's most recent plan.
    pub plan: Option<Plan>,
    /// Accumulated evidence, deduplicated by `chunk_id`, first-occurrence
    /// order preserved (which tracks highest score).
    pub evidence: Vec<ChunkHit>,
    /// Citations attached to the final answer, if any.
    pub citations: Vec<Citation>,
    /// The generator's draft before citation validation.
    pub draft_answer: Option<String>,
    /// The validated, final answer text.
    pub final_answer: Option<String>,
    /// Budget counters.
    pub counters: AgentCounters,
    /// Whether the most recent assessment judged evidence sufficient.
    pub evidence_sufficient: bool,
    /// Why the loop stopped retrieving.
    pub stop_reason: Option<StopReason>,
    /// Why the controller refused, if it did.
    pub refusal_reason: Option<RefusalReason>,
    /// Ordered human-readable trace of node transitions, for diagnostics.
    pub trace: Vec<String>,
}

impl AgentState {
    /// Creates a fresh state for a new question.
    #[must_use]
    pub fn new(question: String) -> Self {
        Self {
            question,
            plan: None,
            evidence: Vec::new(),
            citations: Vec::new(),
            draft_answer: None,
            final_answer: None,
            counters: AgentCounters::default(),
            evidence_sufficient: false,
            stop_reason: None,
            refusal_reason: None,
            trace: Vec::new(),
        }
    }

    /// Records a node transition in the trace and increments `steps`.
    pub fn enter_node(&mut self, name: &str) {
        self.counters.steps += 1;
        self.trace.push(format!("step {}: {name}", self.counters.steps));
    }

    /// Merges newly retrieved hits into evidence, deduplicating by
    /// `chunk_id` and preserving first-occurrence order.
    pub fn merge_evidence(&mut self, new_hits: Vec<ChunkHit>) {
        let mut seen: HashMap<String, usize> = self
            .evidence
            .iter()
            .enumerate()
            .map(|(i, h)| (h.chunk_id.clone(), i))
            .collect();
        for hit in new_hits {
            if !seen.contains_key(&hit.chunk_id) {
                seen.insert(hit.chunk_id.clone(), self.evidence.len());
                self.evidence.push(hit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_evidence_dedups_preserving_first_occurrence() {
        let mut state = AgentState::new("q".to_string());
        let hit_a = ChunkHit {
            score: 1.0,
            chunk_id: "a".to_string(),
            doc_id: "d".to_string(),
            start_page: 1,
            end_page: 1,
            text: "first".to_string(),
        };
        let hit_a_again = ChunkHit {
            score: 9.0,
            chunk_id: "a".to_string(),
            doc_id: "d".to_string(),
            start_page: 1,
            end_page: 1,
            text: "second".to_string(),
        };
        state.merge_evidence(vec![hit_a]);
        state.merge_evidence(vec![hit_a_again]);
        assert_eq!(state.evidence.len(), 1);
        assert_eq!(state.evidence[0].text, "first");
    }

    #[test]
    fn enter_node_increments_steps_and_traces() {
        let mut state = AgentState::new("q".to_string());
        state.enter_node("route");
        state.enter_node("retrieve");
        assert_eq!(state.counters.steps, 2);
        assert_eq!(state.trace.len(), 2);
    }

    #[test]
    fn refusal_reason_message_includes_wire_name() {
        let reason = RefusalReason::Stop(StopReason::ToolBudgetExhausted);
        assert!(reason.message().contains("tool_budget_exhausted"));
    }
}
