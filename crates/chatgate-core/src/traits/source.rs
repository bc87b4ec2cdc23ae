// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Source of raw message batches, implemented by the UI-automation layer.

use async_trait::async_trait;

use crate::error::GateError;
use crate::types::{ConversationRef, Message};

/// Supplies the messages currently visible in one conversation.
///
/// Every message returned by a single [`fetch`](MessageSource::fetch) call
/// must belong to `conversation`.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Returns the batch of messages observed in `conversation`.
    async fn fetch(&self, conversation: &ConversationRef) -> Result<Vec<Message>, GateError>;
}
