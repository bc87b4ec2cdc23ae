// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Storage backends extend the [`Adapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility. Message sources are
//! implemented by the external UI-automation layer.

pub mod adapter;
pub mod source;
pub mod storage;

pub use adapter::Adapter;
pub use source::MessageSource;
pub use storage::MessageStore;
