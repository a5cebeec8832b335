//! Deterministic fallback answers, used only when the generator refuses or
//! its output fails citation validation. Grounded on
//! `original_source/rag/rag_answer.py`'s prompt-construction fallbacks,
//! which this crate generalizes into standalone, re-validated functions.

use crate::core::{ChunkHit, Citation};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static ALGORITHM_QUESTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\balgorithm\s+(\d+)\b").expect("valid regex"));
static STEP_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*:\s*(.+)$").expect("valid regex"));
static COMPARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:differences?\s+between\s+(.+?)\s+and\s+(.+)|compare\s+(.+?)\s+and\s+(.+)|(.+?)\s+vs\.?\s+(.+))")
        .expect("valid regex")
});

const ROLE_PHRASES: &[&str] = &["key-encapsulation mechanism", "digital signature scheme", "key establishment scheme"];

fn chunk_key<'a>(key_to_citation: &'a HashMap<String, Citation>, chunk_id: &str) -> Option<&'a str> {
    key_to_citation
        .iter()
        .find(|(_, c)| c.chunk_id == chunk_id)
        .map(|(k, _)| k.as_str())
}

/// If `question` names `"Algorithm <N>"` and some evidence chunk contains
/// both that marker and numbered step lines, emits one bullet per step:
/// `"- <k>: <body> [c<i>]."` in step order. Returns `None` if no such
/// chunk is found.
#[must_use]
pub fn algorithm_steps_fallback(
    question: &str,
    evidence: &[ChunkHit],
    key_to_citation: &HashMap<String, Citation>,
) -> Option<String> {
    let caps = ALGORITHM_QUESTION_RE.captures(question)?;
    let algorithm_marker = format!("Algorithm {}", &caps[1]);

    for hit in evidence {
        if !hit.text.contains(&algorithm_marker) {
            continue;
        }
        let steps: Vec<(u32, &str)> = hit
            .text
            .lines()
            .filter_map(|line| {
                let m = STEP_LINE_RE.captures(line)?;
                let n: u32 = m[1].parse().ok()?;
                Some((n, m.get(2)?.as_str()))
            })
            .collect();
        if steps.is_empty() {
            continue;
        }
        let Some(key) = chunk_key(key_to_citation, &hit.chunk_id) else { continue };

        let mut sorted_steps = steps;
        sorted_steps.sort_by_key(|&(n, _)| n);
        let bullets: Vec<String> = sorted_steps
            .into_iter()
            .map(|(n, body)| format!("- {n}: {} [{key}].", body.trim()))
            .collect();
        return Some(bullets.join("\n"));
    }
    None
}

fn normalize_token(s: &str) -> String {
    s.trim().trim_end_matches(['?', '.']).to_lowercase()
}

fn find_topic_sentence<'a>(evidence: &'a [ChunkHit], topic: &str) -> Option<(&'a ChunkHit, Option<&'static str>)> {
    let needle = normalize_token(topic);
    evidence.iter().find_map(|hit| {
        let haystack = hit.text.to_lowercase();
        if !haystack.contains(&needle) {
            return None;
        }
        let role = ROLE_PHRASES.iter().find(|phrase| haystack.contains(*phrase)).copied();
        Some((hit, role))
    })
}

fn first_substantive_sentence(text: &str) -> Option<String> {
    text.split(['.', '?', '!'])
        .map(str::trim)
        .find(|s| s.len() >= 25 && s.chars().filter(|c| c.is_alphabetic()).count() >= 12)
        .map(ToString::to_string)
}

/// If `question` matches a comparison pattern (`"differences between A and
/// B"`, `"compare A and B"`, `"A vs B"`), emits three bullets contrasting
/// the two topics, each carrying the citation key(s) of the evidence chunk
/// that mentions it. Returns `None` if the pattern doesn't match or neither
/// topic is found in evidence.
#[must_use]
pub fn comparison_fallback(
    question: &str,
    evidence: &[ChunkHit],
    key_to_citation: &HashMap<String, Citation>,
) -> Option<String> {
    let caps = COMPARE_RE.captures(question)?;
    let (topic_a, topic_b) = (1..=5)
        .step_by(2)
        .find_map(|i| Some((caps.get(i)?.as_str(), caps.get(i + 1)?.as_str())))?;

    let (hit_a, role_a) = find_topic_sentence(evidence, topic_a)?;
    let (hit_b, role_b) = find_topic_sentence(evidence, topic_b)?;

    let key_a = chunk_key(key_to_citation, &hit_a.chunk_id)?;
    let key_b = chunk_key(key_to_citation, &hit_b.chunk_id)?;

    let bullets = if let (Some(role_a), Some(role_b)) = (role_a, role_b) {
        vec![
            format!("- {} is a {role_a} [{key_a}].", topic_a.trim()),
            format!("- {} is a {role_b} [{key_b}].", topic_b.trim()),
            format!("- They serve different purposes: {role_a} vs {role_b} [{key_a}][{key_b}]."),
        ]
    } else {
        let sentence_a = first_substantive_sentence(&hit_a.text).unwrap_or_else(|| hit_a.text.trim().to_string());
        let sentence_b = first_substantive_sentence(&hit_b.text).unwrap_or_else(|| hit_b.text.trim().to_string());
        vec![
            format!("- {sentence_a} [{key_a}]."),
            format!("- {sentence_b} [{key_b}]."),
            format!("- These differ in scope and use case [{key_a}][{key_b}]."),
        ]
    };

    Some(bullets.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::citation::build_context_and_citations;

    fn hit(chunk_id: &str, text: &str) -> ChunkHit {
        ChunkHit {
            score: 1.0,
            chunk_id: chunk_id.to_string(),
            doc_id: "d".to_string(),
            start_page: 1,
            end_page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn algorithm_steps_fallback_emits_ordered_bullets() {
        let evidence = vec![hit(
            "c1",
            "Algorithm 2: SHAKE128\n1: Init ctx\n2: Absorb str1\n3: Squeeze out",
        )];
        let (_, map) = build_context_and_citations(&evidence);
        let result = algorithm_steps_fallback("What are the steps in Algorithm 2 SHAKE128?", &evidence, &map)
            .expect("fallback produced");
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "- 1: Init ctx [c1].");
        assert_eq!(lines[1], "- 2: Absorb str1 [c1].");
        assert_eq!(lines[2], "- 3: Squeeze out [c1].");
    }

    #[test]
    fn algorithm_steps_fallback_none_without_matching_chunk() {
        let evidence = vec![hit("c1", "unrelated text")];
        let (_, map) = build_context_and_citations(&evidence);
        assert!(algorithm_steps_fallback("What are the steps in Algorithm 9?", &evidence, &map).is_none());
    }

    #[test]
    fn comparison_fallback_none_without_compare_intent() {
        let evidence = vec![hit("c1", "ML-KEM is a key-encapsulation mechanism.")];
        let (_, map) = build_context_and_citations(&evidence);
        assert!(comparison_fallback("What is ML-KEM?", &evidence, &map).is_none());
    }

    #[test]
    fn comparison_fallback_emits_role_bullets_when_roles_found() {
        let evidence = vec![
            hit("c1", "ML-KEM is a key-encapsulation mechanism used for key exchange."),
            hit("c2", "ML-DSA is a digital signature scheme used for signing."),
        ];
        let (_, map) = build_context_and_citations(&evidence);
        let result = comparison_fallback("Compare ML-KEM and ML-DSA", &evidence, &map).expect("fallback");
        assert!(result.contains("key-encapsulation mechanism"));
        assert!(result.contains("digital signature scheme"));
    }
}
