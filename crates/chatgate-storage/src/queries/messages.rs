// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message record operations.
//!
//! Listing queries return records most recent first, ordered by the
//! insertion sequence so rows committed in one transaction keep their order.

use chatgate_core::types::format_timestamp;
use chatgate_core::{GateError, InsertOutcome, Message, PersistedRecord};
use rusqlite::params;

use crate::database::{Database, map_tr_err};

const RECORD_COLUMNS: &str = "seq, message_id, raw_data, data_type, direction, \
     conversation_name, conversation_id, captured_at, inserted_at";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedRecord> {
    Ok(PersistedRecord {
        seq: row.get(0)?,
        message_id: row.get(1)?,
        raw_data: row.get(2)?,
        data_type: row.get(3)?,
        direction: row.get(4)?,
        conversation_name: row.get(5)?,
        conversation_id: row.get(6)?,
        captured_at: row.get(7)?,
        inserted_at: row.get(8)?,
    })
}

/// Insert a batch in one transaction, ignoring ids that already exist.
///
/// Repeated ids inside the batch count as duplicates too.
pub async fn insert_batch(
    db: &Database,
    messages: &[Message],
) -> Result<InsertOutcome, GateError> {
    if messages.is_empty() {
        return Ok(InsertOutcome::default());
    }
    let messages = messages.to_vec();
    let inserted_at = format_timestamp(&chrono::Utc::now());
    db.connection()
        .call(move |conn| -> Result<InsertOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO messages (message_id, raw_data, data_type, direction, \
                     conversation_name, conversation_id, captured_at, inserted_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for msg in &messages {
                    inserted += stmt.execute(params![
                        msg.id,
                        msg.raw_data,
                        msg.data_type,
                        msg.direction.to_string(),
                        msg.conversation.name,
                        msg.conversation.id,
                        format_timestamp(&msg.captured_at),
                        inserted_at,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(InsertOutcome {
                inserted,
                duplicates: messages.len() - inserted,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Whether a record with this message id is committed.
pub async fn message_exists(db: &Database, message_id: &str) -> Result<bool, GateError> {
    let message_id = message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM messages WHERE message_id = ?1)",
                params![message_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// List records, most recent first. `None` returns every record.
pub async fn list_messages(
    db: &Database,
    limit: Option<u32>,
) -> Result<Vec<PersistedRecord>, GateError> {
    // SQLite treats a negative LIMIT as unbounded.
    let limit = limit.map(i64::from).unwrap_or(-1);
    db.connection()
        .call(move |conn| -> Result<Vec<PersistedRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM messages ORDER BY seq DESC LIMIT ?1"
            ))?;
            let records = stmt
                .query_map(params![limit], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

/// List records of one conversation name, most recent first.
pub async fn list_messages_by_conversation(
    db: &Database,
    conversation_name: &str,
    limit: Option<u32>,
) -> Result<Vec<PersistedRecord>, GateError> {
    let conversation_name = conversation_name.to_string();
    let limit = limit.map(i64::from).unwrap_or(-1);
    db.connection()
        .call(move |conn| -> Result<Vec<PersistedRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM messages WHERE conversation_name = ?1 \
                 ORDER BY seq DESC LIMIT ?2"
            ))?;
            let records = stmt
                .query_map(params![conversation_name, limit], row_to_record)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count_messages(db: &Database) -> Result<i64, GateError> {
    db.connection()
        .call(|conn| -> Result<i64, rusqlite::Error> {
            conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        })
        .await
        .map_err(map_tr_err)
}
