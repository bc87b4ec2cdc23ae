// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for chatgate.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level chatgate configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatgateConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Per-conversation rate limiting.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Batched persistence writer.
    #[serde(default)]
    pub writer: WriterConfig,

    /// Storage location settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Sliding-window rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    /// Seconds a deferred conversation stays gated before it fully reopens.
    #[serde(default = "default_limit_time_secs")]
    pub limit_time_secs: u64,

    /// Maximum number of messages delivered per conversation per window.
    #[serde(default = "default_max_messages_per_window")]
    pub max_messages_per_window: usize,

    /// Length of the rate window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            limit_time_secs: default_limit_time_secs(),
            max_messages_per_window: default_max_messages_per_window(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_limit_time_secs() -> u64 {
    3600
}

fn default_max_messages_per_window() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

/// Batched persistence writer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WriterConfig {
    /// Number of staged messages that triggers a flush.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Milliseconds since the last flush after which staged messages are flushed.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Attempts per flush before the writer gives up.
    #[serde(default = "default_max_flush_attempts")]
    pub max_flush_attempts: u32,

    /// Backoff before the first retry; doubles on each further retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl WriterConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_flush_attempts: default_max_flush_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}

fn default_flush_interval_ms() -> u64 {
    1000
}

fn default_max_flush_attempts() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    200
}

/// Storage location configuration.
///
/// The database lives in a per-profile directory under the platform data
/// directory unless `database_path` names an explicit file.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Chat platform the profile belongs to.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// Profile identifier within the platform.
    #[serde(default = "default_profile")]
    pub profile: String,

    /// Explicit path to the SQLite database file. Overrides platform/profile.
    #[serde(default)]
    pub database_path: Option<String>,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl StorageConfig {
    /// Resolves the database file location.
    ///
    /// `<data_dir>/chatgate/platforms/<platform>/<profile>/messages.db`, falling
    /// back to the working directory when no data directory is known.
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return PathBuf::from(path);
        }
        dirs::data_dir()
            .map(|p| p.join("chatgate"))
            .unwrap_or_else(|| PathBuf::from(".chatgate"))
            .join("platforms")
            .join(self.platform.to_lowercase())
            .join(&self.profile)
            .join("messages.db")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            profile: default_profile(),
            database_path: None,
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_platform() -> String {
    "whatsapp".to_string()
}

fn default_profile() -> String {
    "default".to_string()
}

fn default_wal_mode() -> bool {
    true
}
