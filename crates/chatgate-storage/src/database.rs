// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chatgate_core::GateError;
use tracing::{debug, info};

use crate::migrations;

/// How long SQLite waits on a locked database before failing a statement.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Convert a tokio-rusqlite error into GateError::Storage.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> GateError {
    GateError::Storage {
        source: Box::new(e),
    }
}

/// Handle to an open, migrated SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: PathBuf,
}

impl Database {
    /// Open a database in WAL mode, creating it and its directory if missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, GateError> {
        Self::open_with(path, true).await
    }

    /// Open a database, applying PRAGMAs and running pending migrations.
    pub async fn open_with(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, GateError> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(GateError::Config("database path is empty".to_string()));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| GateError::Config(format!(
                "cannot create database directory {}: {e}",
                parent.display()
            )))?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| GateError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            if wal_mode {
                let mode: String =
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| match e {
                tokio_rusqlite::Error::Error(inner) => inner,
                other => GateError::Storage {
                    source: Box::new(other),
                },
            })?;

        info!(path = %path.display(), wal_mode, "database opened");
        Ok(Self { conn, path })
    }

    /// The shared connection. Clones talk to the same background thread.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checkpoint the WAL into the main database file.
    pub async fn checkpoint(&self) -> Result<(), GateError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    /// Close the connection, waiting for queued calls to finish.
    ///
    /// Every clone of the connection is closed with it; later calls fail
    /// with a storage error.
    pub async fn close(&self) -> Result<(), GateError> {
        self.conn.clone().close().await.map_err(map_tr_err)
    }
}
