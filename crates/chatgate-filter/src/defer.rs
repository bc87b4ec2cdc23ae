// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO of batches held back by the rate limiter.
//!
//! The queue only stores. Redelivery, expiry, and alerting belong to whoever
//! drains it; entries are never deduplicated or dropped here.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chatgate_core::{ConversationRef, Message};
use chrono::{DateTime, Utc};

/// A batch that arrived while its conversation was over quota.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredBatch {
    pub conversation: ConversationRef,
    /// Messages in the order they were offered.
    pub messages: Vec<Message>,
    /// When the limiter deferred the batch.
    pub observed_at: DateTime<Utc>,
}

/// Thread-safe FIFO of [`DeferredBatch`] entries.
#[derive(Debug, Default)]
pub struct DeferQueue {
    inner: Mutex<VecDeque<DeferredBatch>>,
}

impl DeferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<DeferredBatch>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, batch: DeferredBatch) {
        self.lock().push_back(batch);
    }

    /// Removes the oldest entry.
    pub fn pop(&self) -> Option<DeferredBatch> {
        self.lock().pop_front()
    }

    /// Removes every entry, oldest first.
    pub fn drain(&self) -> Vec<DeferredBatch> {
        self.lock().drain(..).collect()
    }

    /// Removes the entries of one conversation, oldest first, keeping the rest in order.
    pub fn drain_conversation(&self, key: &str) -> Vec<DeferredBatch> {
        let mut queue = self.lock();
        let (taken, kept): (VecDeque<_>, VecDeque<_>) = queue
            .drain(..)
            .partition(|batch| batch.conversation.key() == key);
        *queue = kept;
        taken.into()
    }

    /// Number of entries queued for one conversation.
    pub fn pending_for(&self, key: &str) -> usize {
        self.lock()
            .iter()
            .filter(|batch| batch.conversation.key() == key)
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
