//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary data directory.

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

const NOW: &str = "2026-03-02T07:00:00Z";

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_studyplan"))
        .args(args)
        .env("STUDYPLAN_HOME", home)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn write_workload(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("workload.json");
    let workload = serde_json::json!({
        "tasks": [
            {
                "id": "read",
                "title": "Chapter 4",
                "type": "reading",
                "due_at": "2026-03-07T07:00:00Z",
                "estimated_hours": 2.0
            }
        ],
        "events": [],
        "blocks": []
    });
    std::fs::write(&path, serde_json::to_string_pretty(&workload).unwrap()).unwrap();
    path
}

fn read_workload(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_plan_json() {
    let home = TempDir::new().unwrap();
    let workload = write_workload(&home);
    let path = workload.to_str().unwrap();

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["plan", "--workload", path, "--now", NOW, "--seed", "7", "--json"],
    );
    assert_eq!(code, 0, "plan failed: {stderr}");

    let outcome: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let blocks = outcome["blocks"].as_array().unwrap();
    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0]["task_id"], "read");
    assert_eq!(outcome["reports"][0]["status"], "fully_scheduled");

    // Without --write the file is untouched
    assert!(read_workload(&workload)["blocks"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[test]
fn test_plan_is_deterministic_with_seed() {
    let home = TempDir::new().unwrap();
    let workload = write_workload(&home);
    let path = workload.to_str().unwrap();
    let args = ["plan", "--workload", path, "--now", NOW, "--seed", "11", "--json"];

    let (first, _, _) = run_cli(home.path(), &args);
    let (second, _, _) = run_cli(home.path(), &args);
    assert_eq!(first, second);
}

#[test]
fn test_plan_write_persists_blocks() {
    let home = TempDir::new().unwrap();
    let workload = write_workload(&home);
    let path = workload.to_str().unwrap();

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["plan", "--workload", path, "--now", NOW, "--seed", "7", "--write"],
    );
    assert_eq!(code, 0, "plan failed: {stderr}");
    assert!(stdout.contains("read"));
    assert!(stdout.contains("scheduled"));

    let saved = read_workload(&workload);
    assert_eq!(saved["blocks"].as_array().unwrap().len(), 1);
    assert_eq!(saved["reports"][0]["task_id"], "read");
}

#[test]
fn test_complete_clears_generated_blocks() {
    let home = TempDir::new().unwrap();
    let workload = write_workload(&home);
    let path = workload.to_str().unwrap();

    let (_, _, code) = run_cli(
        home.path(),
        &["plan", "--workload", path, "--now", NOW, "--seed", "7", "--write"],
    );
    assert_eq!(code, 0);

    let (_, stderr, code) = run_cli(
        home.path(),
        &["complete", "read", "--workload", path, "--now", NOW, "--json"],
    );
    assert_eq!(code, 0, "complete failed: {stderr}");

    let saved = read_workload(&workload);
    assert_eq!(saved["tasks"][0]["status"], "completed");
    assert!(saved["blocks"].as_array().unwrap().is_empty());

    let (stdout, _, code) = run_cli(
        home.path(),
        &["complete", "read", "--workload", path, "--now", NOW],
    );
    assert_eq!(code, 0);
    assert!(stdout.contains("already completed"));
}

#[test]
fn test_complete_unknown_task_fails() {
    let home = TempDir::new().unwrap();
    let workload = write_workload(&home);
    let path = workload.to_str().unwrap();

    let (_, stderr, code) = run_cli(
        home.path(),
        &["complete", "nope", "--workload", path, "--now", NOW],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
    assert!(stderr.contains("nope"));
}

#[test]
fn test_plan_missing_workload_fails() {
    let home = TempDir::new().unwrap();
    let missing = home.path().join("missing.json");

    let (_, stderr, code) = run_cli(
        home.path(),
        &["plan", "--workload", missing.to_str().unwrap()],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("workload file not found"));
}

#[test]
fn test_config_get_set() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "preferred_session_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "90");

    let (stdout, _, code) = run_cli(home.path(), &["config", "set", "daily_max_hours", "5"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "ok");

    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "daily_max_hours"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim().parse::<f64>().unwrap(), 5.0);
    assert!(home.path().join("config.toml").exists());
}

#[test]
fn test_config_rejects_invalid_value() {
    let home = TempDir::new().unwrap();

    let (_, stderr, code) = run_cli(home.path(), &["config", "set", "min_session_minutes", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("min_session_minutes"));

    let (_, _, code) = run_cli(home.path(), &["config", "get", "no_such_key"]);
    assert_eq!(code, 1);
}

#[test]
fn test_config_list_json() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["config", "list", "--json"]);
    assert_eq!(code, 0);
    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(config["study_start"], "08:00");
}

#[test]
fn test_energy_show_and_feedback() {
    let home = TempDir::new().unwrap();

    let (stdout, _, code) = run_cli(home.path(), &["energy", "show", "--day", "mon"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Mon Energy Profile"));
    assert!(stdout.contains("09:00"));

    let (_, _, code) = run_cli(
        home.path(),
        &["energy", "feedback", "--hour", "9", "--rating", "5"],
    );
    assert_eq!(code, 0);
    assert!(home.path().join("energy.json").exists());

    let (_, stderr, code) = run_cli(
        home.path(),
        &["energy", "feedback", "--hour", "9", "--rating", "9"],
    );
    assert_eq!(code, 1);
    assert!(stderr.contains("rating"));
}

#[test]
fn test_energy_invalid_day() {
    let home = TempDir::new().unwrap();

    let (_, stderr, code) = run_cli(home.path(), &["energy", "show", "--day", "someday"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Invalid day"));
}
