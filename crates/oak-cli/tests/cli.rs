use assert_cmd::Command;
use oak_index::{Database, queries::sessions};
use oak_testing::fixtures::sample_session;
use predicates::prelude::*;
use tempfile::tempdir;

fn cmd() -> Command {
    Command::cargo_bin("oak-ci").unwrap()
}

#[test]
fn stats_on_fresh_workspace_reports_zero_counts() {
    let workspace = tempdir().unwrap();

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sessions\": 0"));
}

#[test]
fn search_on_fresh_workspace_returns_empty_results() {
    let workspace = tempdir().unwrap();

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "search", "anything"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"results\": []"));
}

#[test]
fn search_rejects_unknown_search_type() {
    let workspace = tempdir().unwrap();

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "search", "anything", "--search-type", "nonsense"])
        .assert()
        .failure();
}

#[test]
fn sync_on_fresh_workspace_reports_nothing_to_sync_or_runs_clean() {
    let workspace = tempdir().unwrap();

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "sync", "--dry-run"])
        .assert()
        .success();
}

#[test]
fn stats_reflects_rows_seeded_before_the_cli_opened_the_workspace() {
    let workspace = tempdir().unwrap();
    let db = Database::open(&workspace.path().join("oak.sqlite3")).unwrap();
    let conn = db.into_conn();
    sessions::upsert(&conn, &sample_session("preexisting", "/repo")).unwrap();
    drop(conn);

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sessions\": 1"));
}

#[test]
fn repeated_invocations_reuse_the_same_workspace_state() {
    let workspace = tempdir().unwrap();

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "stats"])
        .assert()
        .success();

    assert!(workspace.path().join("oak.sqlite3").exists());

    cmd()
        .args(["--workspace", workspace.path().to_str().unwrap(), "stats"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"sessions\": 0"));
}
