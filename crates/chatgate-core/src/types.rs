// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message and record types shared by the filter, storage, and pipeline crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Timestamp format used for every persisted timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Formats a UTC timestamp the way records are stored.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Whether a message was received or sent by the automated profile.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Reference to the conversation (chat, thread, contact) owning a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationRef {
    /// Stable unique identity of the conversation. Used as the conversation key.
    pub id: String,
    /// Display name of the conversation.
    pub name: String,
}

impl ConversationRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// The key that partitions rate-limiter state.
    pub fn key(&self) -> &str {
        &self.id
    }

    /// A reference with a blank id cannot be attributed to any conversation.
    pub fn is_valid(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

/// A message captured by the UI-automation layer.
///
/// The pipeline only interprets `id`, `conversation`, and `captured_at`;
/// the payload is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Stable unique identity of the message.
    pub id: String,
    /// Owning conversation.
    pub conversation: ConversationRef,
    /// Raw payload as scraped.
    pub raw_data: String,
    /// Payload type tag (text, image, ...).
    pub data_type: String,
    pub direction: Direction,
    /// When the automation layer observed the message.
    pub captured_at: DateTime<Utc>,
}

/// A durable row derived from a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    /// Insertion sequence; strictly increasing across commits.
    pub seq: i64,
    pub message_id: String,
    pub raw_data: String,
    pub data_type: String,
    pub direction: String,
    pub conversation_name: String,
    pub conversation_id: String,
    pub captured_at: String,
    pub inserted_at: String,
}

/// Result of committing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows actually written.
    pub inserted: usize,
    /// Rows skipped because their message id already existed.
    pub duplicates: usize,
}

impl InsertOutcome {
    /// Adds another outcome into this one.
    pub fn absorb(&mut self, other: InsertOutcome) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}
