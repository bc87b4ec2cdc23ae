// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for chatgate.

use thiserror::Error;

/// The primary error type used across the admission and persistence pipeline.
#[derive(Debug, Error)]
pub enum GateError {
    /// Configuration errors (invalid values, unusable storage location).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A batch violated the caller contract (blank conversation id, mixed conversations).
    #[error("invalid batch: {message}")]
    InvalidBatch { message: String },

    /// The batch writer no longer accepts messages.
    #[error("batch writer is closed")]
    WriterClosed,

    /// A flush kept failing after the configured number of attempts.
    #[error("flush failed after {attempts} attempts: {source}")]
    FlushFailed {
        attempts: u32,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GateError {
    /// Wraps any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        GateError::Storage {
            source: Box::new(err),
        }
    }
}
