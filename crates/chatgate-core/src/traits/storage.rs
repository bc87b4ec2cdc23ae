// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for durable message persistence.

use async_trait::async_trait;

use crate::error::GateError;
use crate::traits::adapter::Adapter;
use crate::types::{InsertOutcome, Message, PersistedRecord};

/// Adapter for durable message storage.
///
/// Implementations must make [`insert_batch`](MessageStore::insert_batch)
/// atomic (all rows commit or none do) and idempotent per message id.
#[async_trait]
pub trait MessageStore: Adapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), GateError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), GateError>;

    /// Inserts a batch in one transaction, skipping ids that already exist.
    async fn insert_batch(&self, messages: &[Message]) -> Result<InsertOutcome, GateError>;

    /// Returns whether a record with this message id has been committed.
    async fn exists(&self, message_id: &str) -> Result<bool, GateError>;

    /// Lists committed records, most recent first.
    async fn list_all(&self, limit: Option<u32>) -> Result<Vec<PersistedRecord>, GateError>;

    /// Lists committed records of one conversation name, most recent first.
    async fn list_by_conversation(
        &self,
        conversation_name: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PersistedRecord>, GateError>;

    /// Counts committed records.
    async fn count(&self) -> Result<i64, GateError>;
}
