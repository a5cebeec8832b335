//! Per-document boilerplate detection: repeated headers/footers.

use super::canon_line;
use crate::core::Page;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Tunable knobs for the cleaner, matching `examples/original_source/rag/clean.py`'s
/// `CleanConfig` defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Number of leading/trailing lines per page inspected for boilerplate.
    pub header_footer_lines: usize,
    /// Fraction of pages a line must repeat on to be considered boilerplate.
    pub boilerplate_ratio: f64,
    /// Minimum canonical line length considered for boilerplate detection.
    pub min_line_len: usize,
    /// Maximum canonical line length considered for boilerplate detection.
    pub max_boilerplate_len: usize,
    /// Whether to run the smart line-joining pass.
    pub join_wrapped_lines: bool,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            header_footer_lines: 3,
            boilerplate_ratio: 0.6,
            min_line_len: 3,
            max_boilerplate_len: 160,
            join_wrapped_lines: true,
        }
    }
}

/// Detects repeated header/footer lines per document, using frequency
/// across non-empty pages. Returns the set of canonical lines to remove for
/// each `doc_id`.
#[must_use]
pub fn detect_boilerplate(pages: &[Page], config: &CleanConfig) -> HashMap<String, HashSet<String>> {
    let mut pages_by_doc: HashMap<&str, Vec<&Page>> = HashMap::new();
    for page in pages {
        pages_by_doc.entry(page.doc_id.as_str()).or_default().push(page);
    }

    let mut result = HashMap::new();
    for (doc_id, doc_pages) in pages_by_doc {
        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut total_pages = 0usize;

        for page in &doc_pages {
            let nonempty: Vec<&str> = page
                .text
                .split('\n')
                .filter(|ln| !ln.trim().is_empty())
                .collect();
            if nonempty.is_empty() {
                continue;
            }
            total_pages += 1;

            let take = config.header_footer_lines.min(nonempty.len());
            let head = &nonempty[..take];
            let tail = &nonempty[nonempty.len() - take..];

            let mut seen = HashSet::new();
            for line in head.iter().chain(tail.iter()) {
                if line.len() < config.min_line_len || line.len() > config.max_boilerplate_len {
                    continue;
                }
                let canon = canon_line(line);
                if !canon.is_empty() {
                    seen.insert(canon);
                }
            }
            for canon in seen {
                *counts.entry(canon).or_insert(0) += 1;
            }
        }

        if total_pages == 0 {
            result.insert(doc_id.to_string(), HashSet::new());
            continue;
        }

        let threshold = (config.boilerplate_ratio * total_pages as f64).floor() as usize;
        let threshold = threshold.max(2);
        let boilerplate: HashSet<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= threshold)
            .map(|(line, _)| line)
            .collect();
        result.insert(doc_id.to_string(), boilerplate);
    }
    result
}
