//! Classification of "verbatim-ish" lines: tables, code/algorithm
//! pseudocode, and math, which must never be joined with adjacent prose.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static STEP_PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(\d+\.|\(\d+\)|step\s+\d+\s*:|algorithm\s+\d+\s*:|input\s*:|output\s*:|require\s*:|ensure\s*:|given\s*:)")
        .expect("valid regex")
});

const MATH_SYMBOLS: &[char] = &[
    '=', '<', '>', '\u{00b1}', '\u{00d7}', '\u{00f7}', '\u{2211}', '\u{220f}', '\u{2208}', '\u{2209}',
    '\u{2248}', '\u{2261}', '\u{2264}', '\u{2265}', '\u{2295}', '\u{2297}',
];

fn is_table_ish(line: &str) -> bool {
    if line.starts_with('|') {
        return true;
    }
    if line.matches('|').count() >= 2 {
        return true;
    }
    WHITESPACE_RUN_RE.find_iter(line).count() >= 2
}

fn is_code_ish(line: &str) -> bool {
    let indented = line.starts_with("    ") || line.starts_with('\t');
    let has_pseudocode_token = ["::=", ":=", "->", "<-"].iter().any(|tok| line.contains(tok))
        || line.contains('{')
        || line.contains('}')
        || line.contains('[')
        || line.contains(']');
    indented || has_pseudocode_token || STEP_PATTERN_RE.is_match(line)
}

fn is_math_ish(line: &str) -> bool {
    line.contains('$')
        || line.contains("\\(")
        || line.contains("\\)")
        || line.contains("\\[")
        || line.contains("\\]")
        || line.chars().any(|c| MATH_SYMBOLS.contains(&c))
}

/// Returns true if `line` is verbatim-ish (table, code/algorithm, or math)
/// and must not be joined with adjacent prose lines during cleaning.
#[must_use]
pub fn is_verbatim_ish(line: &str) -> bool {
    let trimmed = line.trim_end();
    if trimmed.trim().is_empty() {
        return false;
    }
    is_table_ish(trimmed) || is_code_ish(trimmed) || is_math_ish(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_row_is_verbatim() {
        assert!(is_verbatim_ish("| ML-KEM | 512 | 768 |"));
    }

    #[test]
    fn algorithm_step_is_verbatim() {
        assert!(is_verbatim_ish("1: Init ctx"));
        assert!(is_verbatim_ish("Algorithm 2: SHAKE128"));
        assert!(is_verbatim_ish("Input: seed"));
    }

    #[test]
    fn math_expression_is_verbatim() {
        assert!(is_verbatim_ish("c = Enc(pk, m)"));
        assert!(is_verbatim_ish("x \u{2208} Z_q"));
    }

    #[test]
    fn plain_prose_is_not_verbatim() {
        assert!(!is_verbatim_ish("This is a normal sentence about the algorithm."));
    }

    #[test]
    fn blank_line_is_not_verbatim() {
        assert!(!is_verbatim_ish("   "));
    }
}
