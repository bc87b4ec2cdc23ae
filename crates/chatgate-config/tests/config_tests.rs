// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the chatgate configuration system.

use chatgate_config::diagnostic::ConfigError;
use chatgate_config::model::ChatgateConfig;
use chatgate_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known fields deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[log]
level = "debug"

[filter]
limit_time_secs = 120
max_messages_per_window = 5
window_secs = 30

[writer]
batch_size = 20
flush_interval_ms = 250
max_flush_attempts = 3
retry_backoff_ms = 50

[storage]
platform = "telegram"
profile = "work"
database_path = "/tmp/test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.log.level, "debug");
    assert_eq!(config.filter.limit_time_secs, 120);
    assert_eq!(config.filter.max_messages_per_window, 5);
    assert_eq!(config.filter.window_secs, 30);
    assert_eq!(config.writer.batch_size, 20);
    assert_eq!(config.writer.flush_interval_ms, 250);
    assert_eq!(config.writer.max_flush_attempts, 3);
    assert_eq!(config.writer.retry_backoff_ms, 50);
    assert_eq!(config.storage.platform, "telegram");
    assert_eq!(config.storage.profile, "work");
    assert_eq!(config.storage.database_path.as_deref(), Some("/tmp/test.db"));
    assert!(!config.storage.wal_mode);
}

/// Missing sections use defaults without error.
#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.log.level, "info");
    assert_eq!(config.filter.limit_time_secs, 3600);
    assert_eq!(config.filter.max_messages_per_window, 10);
    assert_eq!(config.filter.window_secs, 60);
    assert_eq!(config.writer.batch_size, 50);
    assert_eq!(config.writer.flush_interval_ms, 1000);
    assert_eq!(config.writer.max_flush_attempts, 5);
    assert_eq!(config.storage.platform, "whatsapp");
    assert_eq!(config.storage.profile, "default");
    assert!(config.storage.database_path.is_none());
    assert!(config.storage.wal_mode);
}

/// Unknown field in [filter] produces an UnknownKey diagnostic with a suggestion.
#[test]
fn unknown_filter_key_suggests_correction() {
    let toml = r#"
[filter]
windw_secs = 30
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "windw_secs");
            assert_eq!(suggestion.as_deref(), Some("window_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

/// Unknown top-level section is rejected.
#[test]
fn unknown_section_rejected() {
    let err = load_config_from_str("[telegram]\nbot_token = \"x\"\n")
        .expect_err("unknown section should fail");
    let err_str = format!("{err}");
    assert!(
        err_str.contains("unknown field") || err_str.contains("telegram"),
        "error should mention the unknown section, got: {err_str}"
    );
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_reports_invalid_type() {
    let errors = load_and_validate_str("[writer]\nbatch_size = \"lots\"\n")
        .expect_err("string batch size should fail");
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("batch_size"))),
        "got {errors:?}"
    );
}

/// Non-positive windows are reported by post-deserialization validation.
#[test]
fn non_positive_window_reported_at_load() {
    let errors = load_and_validate_str("[filter]\nwindow_secs = 0\n")
        .expect_err("zero window should fail validation");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { message } if message.contains("window_secs"))
    ));
}

/// Dot-notation overrides (the shape env vars are mapped to) reach nested keys.
#[test]
fn dotted_override_reaches_nested_key() {
    use figment::{Figment, providers::Serialized};

    let config: ChatgateConfig = Figment::new()
        .merge(Serialized::defaults(ChatgateConfig::default()))
        .merge(("writer.flush_interval_ms", 40))
        .extract()
        .expect("should set flush interval via dot notation");

    assert_eq!(config.writer.flush_interval_ms, 40);
}

/// Serialized config round-trips through TOML (used by `chatgate config`).
#[test]
fn config_serializes_to_toml() {
    let config = ChatgateConfig::default();
    let rendered = toml::to_string_pretty(&config).expect("should serialize");
    assert!(rendered.contains("[filter]"));
    let reparsed = load_config_from_str(&rendered).expect("rendered config should load");
    assert_eq!(reparsed.filter, config.filter);
    assert_eq!(reparsed.writer, config.writer);
}
