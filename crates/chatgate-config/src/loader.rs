// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./chatgate.toml` > `~/.config/chatgate/chatgate.toml` > `/etc/chatgate/chatgate.toml`
//! with environment variable overrides via `CHATGATE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ChatgateConfig;

/// System-wide configuration file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/chatgate/chatgate.toml";

/// Configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "chatgate.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/chatgate/chatgate.toml` (system-wide)
/// 3. `~/.config/chatgate/chatgate.toml` (user XDG config)
/// 4. `./chatgate.toml` (local directory)
/// 5. `CHATGATE_*` environment variables
pub fn load_config() -> Result<ChatgateConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ChatgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChatgateConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ChatgateConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ChatgateConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ChatgateConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("chatgate/chatgate.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")`: key names contain underscores, so
/// `CHATGATE_FILTER_WINDOW_SECS` must map to `filter.window_secs`, not
/// `filter.window.secs`.
fn env_provider() -> Env {
    Env::prefixed("CHATGATE_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: CHATGATE_WRITER_BATCH_SIZE -> "writer_batch_size"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("log_", "log.", 1)
            .replacen("filter_", "filter.", 1)
            .replacen("writer_", "writer.", 1)
            .replacen("storage_", "storage.", 1);
        mapped.into()
    })
}
