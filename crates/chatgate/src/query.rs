// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatgate list` and `chatgate exists` command implementations.
//!
//! Both read the store directly; no writer is started.

use std::io::Write;

use chatgate_config::model::ChatgateConfig;
use chatgate_core::{GateError, MessageStore, PersistedRecord};
use chatgate_storage::SqliteStorage;

/// Fetch records, most recent first.
pub async fn list_records(
    config: &ChatgateConfig,
    conversation: Option<&str>,
    limit: Option<u32>,
) -> Result<Vec<PersistedRecord>, GateError> {
    let storage = SqliteStorage::open(config.storage.clone()).await?;
    let records = match conversation {
        Some(name) => storage.list_by_conversation(name, limit).await?,
        None => storage.list_all(limit).await?,
    };
    storage.close().await?;
    Ok(records)
}

/// Run the `chatgate list` command, printing one JSON record per line.
pub async fn run_list(
    config: &ChatgateConfig,
    conversation: Option<&str>,
    limit: Option<u32>,
) -> Result<(), GateError> {
    let records = list_records(config, conversation, limit).await?;
    let mut out = std::io::stdout().lock();
    for record in &records {
        let line = serde_json::to_string(record)
            .map_err(|e| GateError::Internal(format!("failed to encode record: {e}")))?;
        writeln!(out, "{line}")
            .map_err(|e| GateError::Internal(format!("failed to write output: {e}")))?;
    }
    Ok(())
}

/// Run the `chatgate exists` command.
pub async fn run_exists(config: &ChatgateConfig, message_id: &str) -> Result<bool, GateError> {
    let storage = SqliteStorage::open(config.storage.clone()).await?;
    let exists = storage.exists(message_id).await?;
    storage.close().await?;
    Ok(exists)
}
