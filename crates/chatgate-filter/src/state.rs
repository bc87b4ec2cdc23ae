// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window state tracked per conversation.

use chrono::{DateTime, Utc};

/// Whether a conversation is currently inside a deferral episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStatus {
    /// No deferral episode in progress.
    Normal,
    /// The conversation exceeded its quota and has not been released yet.
    Deferred,
}

/// Window counters and deferral timestamps for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    /// Start of the current rate window.
    pub window_start: DateTime<Utc>,
    /// Messages delivered in the current window.
    pub count: usize,
    /// When the current deferral episode began.
    pub defer_since: Option<DateTime<Utc>>,
    /// When a batch was last delivered.
    pub last_seen: Option<DateTime<Utc>>,
}

impl ConversationState {
    /// Fresh, non-deferred state with a window starting at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 0,
            defer_since: None,
            last_seen: None,
        }
    }

    /// Clears counters, window, deferral, and last-seen.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }

    pub fn status(&self) -> ConversationStatus {
        if self.defer_since.is_some() {
            ConversationStatus::Deferred
        } else {
            ConversationStatus::Normal
        }
    }
}
