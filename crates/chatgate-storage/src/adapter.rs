// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the MessageStore trait.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use chatgate_config::model::StorageConfig;
use chatgate_core::{
    Adapter, GateError, HealthStatus, InsertOutcome, Message, MessageStore, PersistedRecord,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed message store.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily opened on the first call to
/// [`MessageStore::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
    closed: AtomicBool,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database is not opened until [`initialize`](MessageStore::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Create and initialize in one step.
    pub async fn open(config: StorageConfig) -> Result<Self, GateError> {
        let storage = Self::new(config);
        storage.initialize().await?;
        Ok(storage)
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, GateError> {
        self.db.get().ok_or_else(|| GateError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl Adapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn health_check(&self) -> Result<HealthStatus, GateError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), GateError> {
        if self.db.get().is_some() {
            self.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStorage {
    async fn initialize(&self) -> Result<(), GateError> {
        let path = self.config.resolved_database_path();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| GateError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(
            path = %path.display(),
            platform = %self.config.platform,
            profile = %self.config.profile,
            "SQLite storage initialized"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), GateError> {
        let db = self.db()?;
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        db.checkpoint().await?;
        db.close().await?;
        debug!(path = %db.path().display(), "sqlite storage closed");
        Ok(())
    }

    async fn insert_batch(&self, messages: &[Message]) -> Result<InsertOutcome, GateError> {
        queries::messages::insert_batch(self.db()?, messages).await
    }

    async fn exists(&self, message_id: &str) -> Result<bool, GateError> {
        queries::messages::message_exists(self.db()?, message_id).await
    }

    async fn list_all(&self, limit: Option<u32>) -> Result<Vec<PersistedRecord>, GateError> {
        queries::messages::list_messages(self.db()?, limit).await
    }

    async fn list_by_conversation(
        &self,
        conversation_name: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PersistedRecord>, GateError> {
        queries::messages::list_messages_by_conversation(self.db()?, conversation_name, limit)
            .await
    }

    async fn count(&self) -> Result<i64, GateError> {
        queries::messages::count_messages(self.db()?).await
    }
}
