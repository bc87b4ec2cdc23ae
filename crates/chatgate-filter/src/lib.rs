// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission control for chatgate.
//!
//! A [`RateLimiter`] tracks one [`ConversationState`] per conversation and
//! parks over-quota batches in its [`DeferQueue`].

pub mod defer;
pub mod limiter;
pub mod state;

pub use defer::{DeferQueue, DeferredBatch};
pub use limiter::{Decision, RateLimiter, RatePolicy, Verdict};
pub use state::{ConversationState, ConversationStatus};
