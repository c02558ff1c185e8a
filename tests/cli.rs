use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("corpus-api").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("corpus-api").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_resources_lists_both_paths() {
    let mut cmd = Command::cargo_bin("corpus-api").unwrap();
    cmd.arg("resources")
        .assert()
        .success()
        .stdout(predicate::str::contains("sentences_search"))
        .stdout(predicate::str::contains("direct"));
}

#[test]
fn test_index_then_search_empty_corpus() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("corpus.db");
    let index_dir = dir.path().join("index");

    let mut index = Command::cargo_bin("corpus-api").unwrap();
    index
        .args(["--db"])
        .arg(&db)
        .args(["--index-dir"])
        .arg(&index_dir)
        .args(["--quiet", "index"])
        .assert()
        .success();

    let mut search = Command::cargo_bin("corpus-api").unwrap();
    search
        .args(["--db"])
        .arg(&db)
        .args(["--index-dir"])
        .arg(&index_dir)
        .args(["--quiet", "search", "sentences_search", "lang=eng"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_count\": 0"));
}

#[test]
fn test_unknown_resource_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::cargo_bin("corpus-api").unwrap();
    cmd.args(["--db"])
        .arg(dir.path().join("corpus.db"))
        .args(["--index-dir"])
        .arg(dir.path().join("index"))
        .args(["--quiet", "list", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown resource"));
}
