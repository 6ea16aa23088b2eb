use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn make_home() -> tempfile::TempDir {
    tempfile::tempdir().expect("tempdir")
}

fn fixture(name: &str) -> String {
    format!(
        "{}/../stream/tests/fixtures/{name}",
        env!("CARGO_MANIFEST_DIR")
    )
}

fn run(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agentdeck"))
        .args(args)
        .env("HOME", home)
        .env("RUST_LOG", "warn")
        .env_remove("AGENTDECK_SERVER_URL")
        .env_remove("AGENTDECK_API_KEY")
        .output()
        .expect("run agentdeck")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn replay_prints_text_transcript() {
    let home = make_home();
    let capture = fixture("research_task.sse");
    let output = run(
        home.path(),
        &["replay", &capture, "--chunk-bytes", "16", "--prompt", "find sse crates"],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains("you> find sse crates"));
    assert!(text.contains("  -> web_search"));
    assert!(text.contains("  <- web_search ok (812ms)"));
    assert!(text.contains("agent> Found three candidate crates.\n"));
    assert!(text.contains("done: Found three candidate crates."));
    assert!(text.contains("task task-7f3a completed"));
    assert!(!text.contains("straggler"));
}

#[test]
fn replay_of_failed_task_exits_nonzero() {
    let home = make_home();
    let capture = fixture("failed_task.sse");
    let output = run(home.path(), &["replay", &capture, "--format", "json"]);

    assert_eq!(output.status.code(), Some(1));
    let doc: Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(doc["status"]["state"], "failed");
    assert_eq!(doc["status"]["task_id"], "task-err");
    let kinds: Vec<&str> = doc["messages"]
        .as_array()
        .expect("messages")
        .iter()
        .filter_map(|m| m["body"]["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["llm_response", "error_message", "workflow_result"]);
    assert_eq!(doc["messages"][0]["body"]["content"], "Let me check");
}

#[test]
fn replay_writes_archive_and_jsonl() {
    let home = make_home();
    let capture = fixture("research_task.sse");
    let archive = home.path().join("research.jsonl");
    let archive_arg = archive.to_string_lossy().into_owned();
    let output = run(
        home.path(),
        &[
            "replay",
            &capture,
            "--prompt",
            "find sse crates",
            "--format",
            "jsonl",
            "--archive",
            &archive_arg,
        ],
    );
    assert!(output.status.success());

    let text = stdout(&output);
    let lines: Vec<Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).expect("jsonl line"))
        .collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0]["body"]["kind"], "user_message");
    assert_eq!(lines[5]["type"], "status");
    assert_eq!(lines[5]["status"]["state"], "completed");

    let stored = fs::read_to_string(&archive).expect("read archive");
    let parsed = agentdeck_core::jsonl::from_jsonl_str(&stored).expect("parse archive");
    assert_eq!(parsed.transcript.task_id.as_deref(), Some("task-7f3a"));
    assert_eq!(parsed.transcript.len(), 5);
    assert_eq!(parsed.stats.tool_call_count, 1);
}

#[test]
fn replay_missing_file_reports_error() {
    let home = make_home();
    let missing = home.path().join("nope.sse");
    let output = run(home.path(), &["replay", &missing.to_string_lossy()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to read capture"));
}

#[test]
fn config_set_then_show_masks_key() {
    let home = make_home();
    let output = run(
        home.path(),
        &["config", "--server", "https://deck.example.com/", "--api-key", "sk-secret-123"],
    );
    assert!(output.status.success());

    let stored = fs::read_to_string(home.path().join(".config/agentdeck/agentdeck.toml"))
        .expect("config written");
    assert!(stored.contains("https://deck.example.com\""));

    let shown = stdout(&run(home.path(), &["config"]));
    assert!(shown.contains("url     = https://deck.example.com"));
    assert!(shown.contains("api_key = sk-s****"));
    assert!(!shown.contains("sk-secret-123"));
}
