use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use mockito::{Matcher, Server};
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::json;
use tempfile::TempDir;

/// Binary with an empty environment, run from `dir` so no stray `.env` is read.
fn tablesync_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tablesync"));
    cmd.env_clear().current_dir(dir).env("RUST_LOG", "warn");
    cmd
}

fn with_table_env(cmd: &mut Command, server: &Server, snapshot: &Path) {
    cmd.env("NC_TABLE_NAME", "tools")
        .env("NC_PROJECT_SLUG", "awesome")
        .env("NC_XC_KEY", "secret-token")
        .env("NC_HOST", server.host_with_port())
        .env("GITHUB_API_URL", server.url())
        .env("JSON_FILE", snapshot);
}

#[test]
fn help_lists_both_actions() {
    let dir = TempDir::new().unwrap();
    tablesync_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("merge").and(contains("update-stars")));
}

#[test]
fn unknown_action_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    tablesync_cmd(dir.path())
        .arg("frobnicate")
        .assert()
        .code(2)
        .stderr(contains("frobnicate"));
}

#[test]
fn missing_action_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    tablesync_cmd(dir.path()).assert().code(2);
}

#[test]
fn missing_configuration_names_the_variable() {
    let dir = TempDir::new().unwrap();
    tablesync_cmd(dir.path())
        .arg("merge")
        .assert()
        .code(1)
        .stderr(contains("NC_TABLE_NAME"));
}

#[test]
fn invalid_row_limit_is_rejected() {
    let dir = TempDir::new().unwrap();
    tablesync_cmd(dir.path())
        .env("NC_TABLE_NAME", "tools")
        .env("NC_PROJECT_SLUG", "awesome")
        .env("NC_XC_KEY", "secret-token")
        .env("NC_ROW_LIMIT", "lots")
        .arg("merge")
        .assert()
        .code(1)
        .stderr(contains("NC_ROW_LIMIT"));
}

#[test]
fn dot_env_file_supplies_configuration() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join(".env"),
        "NC_TABLE_NAME=tools\nNC_PROJECT_SLUG=awesome\nNC_XC_KEY=k\nNC_ROW_LIMIT=0\n",
    )
    .unwrap();
    // Getting past the required variables proves `.env` was read.
    tablesync_cmd(dir.path())
        .arg("merge")
        .assert()
        .code(1)
        .stderr(contains("NC_ROW_LIMIT").and(contains("NC_TABLE_NAME").not()));
}

#[test]
fn merge_fetch_error_exits_nonzero_and_writes_nothing() {
    let mut server = Server::new();
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("tools.json");
    std::fs::write(&snapshot, "[]").unwrap();

    server
        .mock("GET", "/nc/awesome/api/v1/tools")
        .match_query(Matcher::Any)
        .with_status(500)
        .create();
    let delete = server.mock("DELETE", Matcher::Any).expect(0).create();
    let insert = server.mock("POST", Matcher::Any).expect(0).create();

    let mut cmd = tablesync_cmd(dir.path());
    with_table_env(&mut cmd, &server, &snapshot);
    cmd.arg("merge")
        .assert()
        .code(1)
        .stderr(contains("500"));

    delete.assert();
    insert.assert();
    assert_eq!(std::fs::read_to_string(&snapshot).unwrap(), "[]");
}

#[test]
fn merge_dry_run_prints_diff() {
    let mut server = Server::new();
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("tools.json");

    server
        .mock("GET", "/nc/awesome/api/v1/tools")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"list": [{"id": 1, "updated_at": "2021-01-01 00:00"}]}).to_string())
        .create();
    let writes = server.mock("POST", Matcher::Any).expect(0).create();

    let mut cmd = tablesync_cmd(dir.path());
    with_table_env(&mut cmd, &server, &snapshot);
    cmd.args(["merge", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run] would write").and(contains("+    \"id\": 1,")));

    writes.assert();
    assert!(!snapshot.exists());
}

#[test]
fn merge_json_report() {
    let mut server = Server::new();
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("tools.json");

    server
        .mock("GET", "/nc/awesome/api/v1/tools")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(json!({"list": [{"id": 1, "updated_at": "2021-01-01 00:00"}]}).to_string())
        .create();
    server
        .mock("DELETE", "/nc/awesome/api/v1/bulk/tools")
        .with_status(200)
        .create();
    server
        .mock("POST", "/nc/awesome/api/v1/bulk/tools")
        .with_status(200)
        .create();

    let mut cmd = tablesync_cmd(dir.path());
    with_table_env(&mut cmd, &server, &snapshot);
    let output = cmd.args(["merge", "--json"]).output().unwrap();
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["merged_records"], json!(1));
    assert_eq!(report["snapshot"]["result"], json!("written"));
    assert_eq!(report["replace"][0]["phase"], json!("delete"));
    assert_eq!(report["replace"][1]["outcome"]["result"], json!("done"));
    assert!(snapshot.exists());
}

#[test]
fn update_stars_reports_updated_records() {
    let mut server = Server::new();
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("tools.json");

    server
        .mock("GET", "/nc/awesome/api/v1/tools")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(
            json!({"list": [
                {"id": 1, "GitHub URL": null, "GitHub Stars": 0},
                {"id": 2, "GitHub URL": "https://github.com/a/b", "GitHub Stars": 1}
            ]})
            .to_string(),
        )
        .create();
    server
        .mock("GET", "/repos/a/b")
        .with_status(200)
        .with_body(r#"{"stargazers_count": 5}"#)
        .create();
    let patch = server
        .mock("PATCH", "/nc/awesome/api/v1/tools/2")
        .match_body(Matcher::PartialJson(json!({"GitHub Stars": 5})))
        .with_status(200)
        .create();

    let mut cmd = tablesync_cmd(dir.path());
    with_table_env(&mut cmd, &server, &snapshot);
    cmd.args(["update-stars", "--json"])
        .assert()
        .success()
        .stdout(contains("\"updated\": 1").and(contains("\"skipped\": 1")));

    patch.assert();
    assert!(!snapshot.exists());
}
