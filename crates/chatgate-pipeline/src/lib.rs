// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control and durable persistence for captured chat messages.
//!
//! The [`Pipeline`] is the central coordinator that:
//! - Receives message batches per conversation
//! - Passes them through the per-conversation rate limiter
//! - Hands delivered batches to the batched writer
//! - Handles graceful shutdown

pub mod pipeline;
pub mod shutdown;

pub use pipeline::{IngestOutcome, Pipeline};
pub use shutdown::install_signal_handler;
