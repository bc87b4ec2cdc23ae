// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive window sizes, usable profile names, and known log levels.

use crate::diagnostic::ConfigError;
use crate::model::ChatgateConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ChatgateConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.log.level.trim().to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "log.level `{}` is not one of {}",
                config.log.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    // Rate limiter windows
    if config.filter.window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "filter.window_secs must be greater than 0".to_string(),
        });
    }

    if config.filter.max_messages_per_window == 0 {
        errors.push(ConfigError::Validation {
            message: "filter.max_messages_per_window must be greater than 0".to_string(),
        });
    }

    if config.filter.limit_time_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "filter.limit_time_secs must be greater than 0".to_string(),
        });
    }

    // Writer batching
    if config.writer.batch_size == 0 {
        errors.push(ConfigError::Validation {
            message: "writer.batch_size must be greater than 0".to_string(),
        });
    }

    if config.writer.flush_interval_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "writer.flush_interval_ms must be greater than 0".to_string(),
        });
    }

    if config.writer.max_flush_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "writer.max_flush_attempts must be at least 1".to_string(),
        });
    }

    // Storage location
    for (key, value) in [
        ("storage.platform", &config.storage.platform),
        ("storage.profile", &config.storage.profile),
    ] {
        if value.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("{key} must not be empty"),
            });
        } else if value.contains(['/', '\\']) || value == ".." {
            errors.push(ConfigError::Validation {
                message: format!("{key} `{value}` must be a plain directory name"),
            });
        }
    }

    if let Some(path) = &config.storage.database_path
        && path.trim().is_empty()
    {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty when set".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
