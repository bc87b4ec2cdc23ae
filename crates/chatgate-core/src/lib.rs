// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for chatgate.
//!
//! This crate provides the error type, message types, and adapter traits
//! used throughout the workspace. Storage backends implement
//! [`MessageStore`]; the UI-automation layer implements [`MessageSource`].

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::GateError;
pub use types::{
    ConversationRef, Direction, HealthStatus, InsertOutcome, Message, PersistedRecord,
};

pub use traits::{Adapter, MessageSource, MessageStore};
