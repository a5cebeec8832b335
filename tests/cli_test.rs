//! End-to-end CLI tests driving the `docrag` binary through `ingest`,
//! `search`, `ask`, `agent`, and `eval`.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_pages_jsonl(dir: &std::path::Path, name: &str, pages: &[(&str, u32, &str)]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).expect("create pages file");
    for (doc_id, page_number, text) in pages {
        writeln!(file, r#"{{"doc_id":"{doc_id}","page_number":{page_number},"text":"{text}"}}"#).expect("write line");
    }
    path
}

fn cmd() -> Command {
    Command::cargo_bin("docrag").expect("binary builds")
}

#[test]
fn ingest_then_search_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("index");
    let input = write_pages_jsonl(
        dir.path(),
        "pages.jsonl",
        &[("spec-doc", 1, "Algorithm 19: ML-KEM.KeyGen generates a key pair from a random seed.")],
    );

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "ingest", "--input", input.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("spec-doc"));

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "search", "ML-KEM key generation"])
        .assert()
        .success()
        .stdout(predicate::str::contains("spec-doc"));
}

#[test]
fn search_against_missing_index_fails_with_actionable_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("no-such-index");

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "search", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ingest"));
}

#[test]
fn ask_refuses_without_sufficient_evidence_via_config_override() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("index");
    let input = write_pages_jsonl(dir.path(), "pages.jsonl", &[("d", 1, "Some unrelated filler text about nothing in particular.")]);

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "ingest", "--input", input.to_str().unwrap()])
        .assert()
        .success();

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "ask", "What is the airspeed velocity of an unladen swallow?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("not found in provided docs"));
}

#[test]
fn json_output_format_is_valid_json_on_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("no-such-index");

    let output = cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "--format", "json", "search", "anything"])
        .output()
        .expect("run command");

    assert!(!output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("valid json error payload");
    assert_eq!(parsed["success"], false);
    assert!(parsed["error"]["type"].is_string());
}

#[test]
fn eval_reports_summary_for_labeled_questions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let index_dir = dir.path().join("index");
    let input = write_pages_jsonl(
        dir.path(),
        "pages.jsonl",
        &[("spec-doc", 1, "Algorithm 19: ML-KEM.KeyGen generates a key pair from a random seed.")],
    );
    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "ingest", "--input", input.to_str().unwrap()])
        .assert()
        .success();

    let questions_path = dir.path().join("questions.json");
    std::fs::write(
        &questions_path,
        r#"[{"qid":"q1","question":"ML-KEM key generation","answerable":true,"gold":[{"doc_id":"spec-doc","start_page":1,"end_page":1}]}]"#,
    )
    .expect("write questions");

    cmd()
        .args(["--index-dir", index_dir.to_str().unwrap(), "eval", "--questions", questions_path.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("recall").or(predicate::str::contains("Recall")));
}
