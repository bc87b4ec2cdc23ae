// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the built binary against a temporary database.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn write_config(dir: &TempDir) -> PathBuf {
    let db = dir.path().join("data/messages.db");
    let config = format!(
        r#"
[log]
level = "warn"

[filter]
max_messages_per_window = 3
window_secs = 60

[writer]
batch_size = 2
flush_interval_ms = 60000

[storage]
database_path = "{}"
"#,
        db.display().to_string().replace('\\', "/")
    );
    let path = dir.path().join("chatgate.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn message_line(id: &str, chat: &str) -> String {
    format!(
        r#"{{"id":"{id}","conversation":{{"id":"{chat}-id","name":"{chat}"}},"raw_data":"hello {id}","data_type":"text","direction":"inbound","captured_at":"2026-02-01T10:00:00Z"}}"#
    )
}

fn chatgate(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chatgate"))
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

#[test]
fn ingest_then_query() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let input = dir.path().join("input.jsonl");
    let lines = [
        message_line("a1", "Alice"),
        message_line("a2", "Alice"),
        message_line("b1", "Bob"),
        message_line("b2", "Bob"),
        message_line("b3", "Bob"),
        message_line("b4", "Bob"),
    ];
    std::fs::write(&input, lines.join("\n")).unwrap();

    let out = chatgate(&config, &["ingest", "--input", input.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let summary: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(summary["delivered"], 2);
    assert_eq!(summary["deferred"], 4);
    assert_eq!(summary["committed"], 2);

    let out = chatgate(&config, &["list"]);
    assert!(out.status.success());
    let ids: Vec<String> = String::from_utf8(out.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["message_id"].to_string())
        .collect();
    assert_eq!(ids, ["\"a2\"", "\"a1\""]);

    let out = chatgate(&config, &["list", "--conversation", "Bob"]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let out = chatgate(&config, &["exists", "a1"]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "true");

    let out = chatgate(&config, &["exists", "b1"]);
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "false");
}

#[test]
fn ingesting_twice_does_not_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);
    let input = dir.path().join("input.jsonl");
    std::fs::write(&input, [message_line("m1", "Carol"), message_line("m2", "Carol")].join("\n"))
        .unwrap();

    for _ in 0..2 {
        let out = chatgate(&config, &["ingest", "--input", input.to_str().unwrap()]);
        assert!(out.status.success());
    }

    let out = chatgate(&config, &["list", "--limit", "10"]);
    assert_eq!(String::from_utf8_lossy(&out.stdout).lines().count(), 2);
}

#[test]
fn negative_limit_fails_instead_of_listing_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    let out = chatgate(&config, &["list", "--limit", "-3"]);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn invalid_config_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[filter]\nwindow_sec = 60\n").unwrap();

    let out = chatgate(&path, &["config"]);
    assert!(!out.status.success());
}

#[test]
fn config_command_prints_resolved_values() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(&dir);

    let out = chatgate(&config, &["config"]);
    assert!(out.status.success());
    let rendered = String::from_utf8(out.stdout).unwrap();
    assert!(rendered.contains("max_messages_per_window = 3"));
    assert!(rendered.contains("batch_size = 2"));
}
