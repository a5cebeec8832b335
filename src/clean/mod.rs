//! Cleaner (C1): normalizes page text, strips boilerplate, and joins
//! wrapped prose while preserving verbatim lines (tables, code, math).
//!
//! Grounded on `examples/original_source/rag/clean.py` for unicode/whitespace
//! normalization, dehyphenation, and boilerplate detection; the verbatim-
//! aware line classification used during joining is this crate's own
//! addition, since the original always joined every line in a paragraph.

mod boilerplate;
mod verbatim;

pub use boilerplate::{detect_boilerplate, CleanConfig};
pub use verbatim::is_verbatim_ish;

use regex::Regex;
use std::sync::LazyLock;

static ZWSP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\u{200B}\u{200C}\u{200D}\u{FEFF}]").expect("valid regex")
});
static MULTI_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));
static PAGE_NUM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(page\s*)?\d+(\s*of\s*\d+)?\s*$").expect("valid regex"));
static HYPHEN_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z])-\n([a-z])").expect("valid regex"));

/// Applies NFKC normalization, strips the soft hyphen and zero-width
/// characters, and replaces the `fi`/`fl` ligatures with their ASCII forms.
#[must_use]
pub fn normalize_unicode(raw: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    let s: String = raw.nfkc().collect();
    let s = s.replace('\u{00ad}', "");
    let s = ZWSP_RE.replace_all(&s, "");
    s.replace('\u{FB01}', "fi").replace('\u{FB02}', "fl")
}

/// Normalizes line endings to `\n`, strips trailing per-line whitespace, and
/// collapses runs of spaces/tabs to a single space.
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    let s = s.replace("\r\n", "\n").replace('\r', "\n");
    let s: String = s
        .split('\n')
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let s: String = s
        .split('\n')
        .map(|line| MULTI_SPACE_RE.replace_all(line, " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    s.trim().to_string()
}

/// Dehyphenates words broken across a line break: `letter-\nlowercase` ->
/// `letterlowercase`.
#[must_use]
pub fn dehyphenate(s: &str) -> String {
    HYPHEN_BREAK_RE.replace_all(s, "$1$2").into_owned()
}

/// Removes lines that are entirely a standalone page number (optionally
/// `"page N"` or `"N of M"`).
#[must_use]
pub fn remove_standalone_page_numbers(lines: &[&str]) -> Vec<String> {
    lines
        .iter()
        .filter(|ln| !PAGE_NUM_RE.is_match(ln))
        .map(|ln| (*ln).to_string())
        .collect()
}

/// Canonicalizes a line for boilerplate comparison: lowercase, digits
/// removed, whitespace collapsed.
#[must_use]
pub fn canon_line(s: &str) -> String {
    let lowered = s.to_lowercase();
    let no_digits: String = lowered.chars().filter(|c| !c.is_ascii_digit()).collect();
    MULTI_SPACE_RE.replace_all(&no_digits, " ").trim().to_string()
}

/// Joins consecutive non-verbatim lines within a blank-line-delimited block
/// into a single prose line, per the smart line-joining rules: a line joins
/// with the next when it does not end in terminal punctuation or a colon,
/// the next line begins lowercase (or, once the running line reaches 60
/// characters, begins with any alphabetic character), and neither line is
/// verbatim-ish.
#[must_use]
pub fn join_wrapped_paragraph_lines(lines: &[String]) -> Vec<String> {
    let mut paragraphs: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.clone());
        }
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    let mut joined = Vec::new();
    for paragraph in paragraphs {
        joined.push(join_paragraph(&paragraph));
        joined.push(String::new());
    }
    if joined.last().is_some_and(String::is_empty) {
        joined.pop();
    }
    joined
}

fn join_paragraph(lines: &[String]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        if is_verbatim_ish(line) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(line);
            i += 1;
            continue;
        }
        let mut merged = line.to_string();
        let mut j = i + 1;
        while j < lines.len() {
            let next = lines[j].trim();
            if is_verbatim_ish(next) || !should_join(&merged, next) {
                break;
            }
            merged.push(' ');
            merged.push_str(next);
            j += 1;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&merged);
        i = j;
    }
    out
}

fn should_join(current: &str, next: &str) -> bool {
    let ends_terminal = current
        .chars()
        .last()
        .is_some_and(|c| matches!(c, '.' | '?' | '!' | ':'));
    if ends_terminal {
        return false;
    }
    let next_starts_lower = next.chars().next().is_some_and(char::is_lowercase);
    if next_starts_lower {
        return true;
    }
    current.chars().count() >= 60 && next.chars().next().is_some_and(char::is_alphabetic)
}

/// Collapses runs of blank lines to a single blank line.
#[must_use]
pub fn collapse_blank_runs(lines: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut empty_run = 0;
    for line in lines {
        if line.trim().is_empty() {
            empty_run += 1;
            if empty_run <= 1 {
                out.push(String::new());
            }
        } else {
            empty_run = 0;
            out.push(line.clone());
        }
    }
    out
}

/// Cleans one page of raw text against a document-wide boilerplate set,
/// per `CleanConfig`. This is the full C1 pipeline: unicode normalization,
/// whitespace normalization, dehyphenation, page-number removal,
/// boilerplate removal, blank-run collapsing, and (if enabled) smart
/// verbatim-aware line joining.
#[must_use]
pub fn clean_page_text(raw: &str, boilerplate: &std::collections::HashSet<String>, config: &CleanConfig) -> String {
    let s = normalize_unicode(raw);
    let s = normalize_whitespace(&s);
    let s = dehyphenate(&s);

    let lines: Vec<&str> = s.split('\n').collect();
    let lines = remove_standalone_page_numbers(&lines);

    let kept: Vec<String> = lines
        .into_iter()
        .filter(|line| !boilerplate.contains(&canon_line(line)))
        .map(|line| line.trim_end().to_string())
        .collect();

    let squashed = collapse_blank_runs(&kept);

    let result = if config.join_wrapped_lines {
        join_wrapped_paragraph_lines(&squashed)
    } else {
        squashed
    };

    result.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn normalize_unicode_strips_soft_hyphen_and_ligatures() {
        let out = normalize_unicode("soft\u{00ad}hyphen \u{FB01}rst");
        assert_eq!(out, "softhyphen first");
    }

    #[test]
    fn normalize_whitespace_collapses_runs_and_crlf() {
        let out = normalize_whitespace("a\r\nb   c\t\td  \n");
        assert_eq!(out, "a\nb c d");
    }

    #[test]
    fn dehyphenate_joins_broken_word() {
        assert_eq!(dehyphenate("algo-\nrithm"), "algorithm");
    }

    #[test]
    fn remove_standalone_page_numbers_strips_bare_numbers() {
        let lines = vec!["Page 3", "3 of 10", "Real content", "42"];
        let kept = remove_standalone_page_numbers(&lines);
        assert_eq!(kept, vec!["Real content".to_string()]);
    }

    #[test]
    fn canon_line_strips_digits_and_case() {
        assert_eq!(canon_line("NIST SP 800-12 Page 4"), "nist sp - page ");
    }

    #[test]
    fn join_wrapped_paragraph_lines_merges_prose() {
        let lines = vec![
            "this sentence wraps".to_string(),
            "across two lines.".to_string(),
            String::new(),
            "A new paragraph.".to_string(),
        ];
        let joined = join_wrapped_paragraph_lines(&lines);
        assert_eq!(joined[0], "this sentence wraps across two lines.");
        assert_eq!(joined[1], "");
        assert_eq!(joined[2], "A new paragraph.");
    }

    #[test]
    fn join_wrapped_paragraph_lines_preserves_table_rows() {
        let lines = vec![
            "| a | b |".to_string(),
            "| c | d |".to_string(),
        ];
        let joined = join_wrapped_paragraph_lines(&lines);
        assert_eq!(joined, vec!["| a | b |\n| c | d |".to_string()]);
    }

    #[test]
    fn clean_page_text_full_pipeline() {
        let mut boilerplate = HashSet::new();
        boilerplate.insert("nist special publication -".to_string());
        let config = CleanConfig::default();
        let raw = "NIST Special Publication 800-12\n\nThe quick brown fox\njumps over the lazy dog.\n\nPage 3";
        let cleaned = clean_page_text(raw, &boilerplate, &config);
        assert!(!cleaned.contains("NIST Special Publication"));
        assert!(!cleaned.contains("Page 3"));
        assert!(cleaned.contains("The quick brown fox jumps over the lazy dog."));
    }
}
