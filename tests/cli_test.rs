//! CLI smoke tests for the network-free command paths: every command that
//! needs a live embedder/model bails out before touching one when the store
//! is missing, and `completions` needs neither a store nor a model at all.

use assert_cmd::Command;
use predicates::str::contains;

fn cmd() -> Command {
    Command::cargo_bin("reqragctl").unwrap()
}

#[test]
fn query_against_a_missing_store_bails_before_loading_a_model() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("--store")
        .arg(dir.path().join("store.db"))
        .arg("query")
        .arg("בקשות דחופות")
        .assert()
        .failure()
        .stderr(contains("Store not found"));
}

#[test]
fn similar_against_a_missing_store_bails_before_loading_a_model() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("--store")
        .arg(dir.path().join("store.db"))
        .arg("similar")
        .arg("REQ-1")
        .assert()
        .failure()
        .stderr(contains("Store not found"));
}

#[test]
fn stats_against_a_missing_store_bails_with_a_helpful_message() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .current_dir(&dir)
        .arg("--store")
        .arg(dir.path().join("store.db"))
        .arg("stats")
        .assert()
        .failure()
        .stderr(contains("reqragctl init"));
}

#[test]
fn completions_need_no_store_or_model() {
    cmd()
        .arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(contains("reqragctl"));
}

#[test]
fn bare_query_shorthand_reaches_the_same_missing_store_bail_as_the_query_subcommand() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("--store")
        .arg(dir.path().join("store.db"))
        .arg("בקשות דחופות")
        .assert()
        .failure()
        .stderr(contains("Store not found"));
}

#[test]
fn help_lists_every_subcommand() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("index"))
        .stdout(contains("query"))
        .stdout(contains("similar"))
        .stdout(contains("stats"))
        .stdout(contains("doctor"));
}
