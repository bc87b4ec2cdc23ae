// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The admission-controlled persistence pipeline.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chatgate_config::model::ChatgateConfig;
use chatgate_core::{
    ConversationRef, GateError, HealthStatus, Message, MessageSource, MessageStore,
};
use chatgate_filter::{ConversationStatus, DeferredBatch, RateLimiter, Verdict};
use chatgate_storage::{BatchWriter, SqliteStorage, WriterStats};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What happened to one ingested batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub verdict: Verdict,
    /// Messages handed to the writer; zero when deferred.
    pub accepted: usize,
}

/// Rate limiter feeding a batch writer.
///
/// Delivered batches are enqueued while the limiter still holds the
/// conversation, so the writer sees each conversation's batches in the
/// order they were ingested.
pub struct Pipeline {
    limiter: RateLimiter,
    writer: BatchWriter,
}

impl Pipeline {
    /// Open the configured SQLite store and start the writer.
    pub async fn open(config: &ChatgateConfig) -> Result<Self, GateError> {
        let store = SqliteStorage::open(config.storage.clone()).await?;
        Self::with_store(Arc::new(store), config)
    }

    /// Build a pipeline over an already initialized store.
    pub fn with_store(
        store: Arc<dyn MessageStore>,
        config: &ChatgateConfig,
    ) -> Result<Self, GateError> {
        let limiter = RateLimiter::new(&config.filter)?;
        let writer = BatchWriter::start(store, &config.writer)?;
        info!(
            window_secs = config.filter.window_secs,
            quota = config.filter.max_messages_per_window,
            limit_time_secs = config.filter.limit_time_secs,
            "pipeline ready"
        );
        Ok(Self { limiter, writer })
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn writer(&self) -> &BatchWriter {
        &self.writer
    }

    /// Run one batch through the limiter and enqueue whatever it delivers.
    pub fn ingest(&self, messages: Vec<Message>) -> Result<IngestOutcome, GateError> {
        self.ingest_at(messages, Utc::now())
    }

    /// [`ingest`](Self::ingest) with an explicit observation time.
    pub fn ingest_at(
        &self,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, GateError> {
        let len = messages.len();
        let verdict = self
            .limiter
            .apply_with(messages, now, |batch| self.writer.enqueue(batch))?;
        let accepted = match verdict {
            Verdict::Defer => 0,
            Verdict::Deliver | Verdict::Release => len,
        };
        Ok(IngestOutcome { verdict, accepted })
    }

    /// Drop messages already staged or stored, and repeats within the batch.
    pub async fn filter_unseen(&self, messages: Vec<Message>) -> Result<Vec<Message>, GateError> {
        let mut seen = HashSet::new();
        let mut unseen = Vec::with_capacity(messages.len());
        for msg in messages {
            if seen.contains(&msg.id) || self.writer.exists(&msg.id).await? {
                continue;
            }
            seen.insert(msg.id.clone());
            unseen.push(msg);
        }
        Ok(unseen)
    }

    /// Fetch a conversation from `source` and ingest the messages not seen before.
    ///
    /// Messages the store already holds never count against the quota.
    pub async fn poll(
        &self,
        source: &dyn MessageSource,
        conversation: &ConversationRef,
    ) -> Result<IngestOutcome, GateError> {
        let fetched = source.fetch(conversation).await?;
        let fetched_len = fetched.len();
        let fresh = self.filter_unseen(fetched).await?;
        debug!(
            conversation = %conversation.key(),
            fetched = fetched_len,
            fresh = fresh.len(),
            "conversation polled"
        );
        self.ingest(fresh)
    }

    /// Poll every conversation once per `every` until `cancel` fires.
    ///
    /// Per-conversation failures are logged and skipped. A closed writer
    /// ends the loop with an error.
    pub async fn run(
        &self,
        source: &dyn MessageSource,
        conversations: &[ConversationRef],
        every: Duration,
        cancel: CancellationToken,
    ) -> Result<(), GateError> {
        info!(conversations = conversations.len(), "polling loop running");
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping polling loop");
                    break;
                }
                _ = ticker.tick() => {
                    for conversation in conversations {
                        match self.poll(source, conversation).await {
                            Ok(outcome) if outcome.verdict == Verdict::Defer => {
                                debug!(conversation = %conversation.key(), "batch deferred");
                            }
                            Ok(_) => {}
                            Err(GateError::WriterClosed) => return Err(GateError::WriterClosed),
                            Err(e) => {
                                error!(conversation = %conversation.key(), error = %e, "poll failed");
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn status(&self, conversation_key: &str) -> ConversationStatus {
        self.limiter.status(conversation_key)
    }

    /// Remove deferred batches, for one conversation or all of them.
    pub fn take_deferred(&self, conversation_key: Option<&str>) -> Vec<DeferredBatch> {
        let queue = self.limiter.defer_queue();
        match conversation_key {
            Some(key) => queue.drain_conversation(key),
            None => queue.drain(),
        }
    }

    pub fn stats(&self) -> WriterStats {
        self.writer.stats()
    }

    pub fn health(&self) -> HealthStatus {
        self.writer.health()
    }

    /// Drain the writer and close the store.
    pub async fn shutdown(&self) -> Result<(), GateError> {
        let deferred = self.limiter.defer_queue().len();
        if deferred > 0 {
            warn!(deferred, "deferred batches left unpersisted at shutdown");
        }
        self.writer.shutdown().await?;
        self.writer.store().close().await?;
        info!("pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_config::model::{FilterConfig, WriterConfig};
    use chatgate_core::Direction;
    use chrono::TimeDelta;
    use tempfile::tempdir;

    fn msg(id: &str, conv: &str) -> Message {
        Message {
            id: id.to_string(),
            conversation: ConversationRef::new(conv, conv.to_uppercase()),
            raw_data: "hi".to_string(),
            data_type: "text".to_string(),
            direction: Direction::Inbound,
            captured_at: Utc::now(),
        }
    }

    async fn pipeline(dir: &std::path::Path) -> Pipeline {
        let mut config = ChatgateConfig::default();
        config.storage.database_path =
            Some(dir.join("pipeline.db").to_string_lossy().into_owned());
        config.filter = FilterConfig {
            limit_time_secs: 3600,
            max_messages_per_window: 3,
            window_secs: 60,
        };
        config.writer = WriterConfig {
            flush_interval_ms: 60_000,
            ..WriterConfig::default()
        };
        Pipeline::open(&config).await.unwrap()
    }

    #[tokio::test]
    async fn deferred_batches_are_not_enqueued() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        let now = Utc::now();

        let ok = pipeline
            .ingest_at(vec![msg("a", "c1"), msg("b", "c1")], now)
            .unwrap();
        assert_eq!(ok, IngestOutcome { verdict: Verdict::Deliver, accepted: 2 });

        let deferred = pipeline
            .ingest_at(vec![msg("c", "c1"), msg("d", "c1")], now)
            .unwrap();
        assert_eq!(deferred, IngestOutcome { verdict: Verdict::Defer, accepted: 0 });
        assert_eq!(pipeline.status("c1"), ConversationStatus::Deferred);
        assert!(!pipeline.writer().exists("c").await.unwrap());
        assert_eq!(pipeline.stats().enqueued, 2);

        let taken = pipeline.take_deferred(Some("c1"));
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].messages.len(), 2);
        assert!(pipeline.take_deferred(None).is_empty());

        let released = pipeline
            .ingest_at(
                vec![msg("c", "c1"), msg("d", "c1")],
                now + TimeDelta::seconds(3601),
            )
            .unwrap();
        assert_eq!(released.verdict, Verdict::Release);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn filter_unseen_skips_known_and_repeated_ids() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        pipeline.ingest(vec![msg("a", "c1")]).unwrap();

        let fresh = pipeline
            .filter_unseen(vec![msg("a", "c1"), msg("b", "c1"), msg("b", "c1")])
            .await
            .unwrap();
        let ids: Vec<_> = fresh.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["b"]);

        pipeline.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn ingest_after_shutdown_fails() {
        let dir = tempdir().unwrap();
        let pipeline = pipeline(dir.path()).await;
        pipeline.shutdown().await.unwrap();

        let err = pipeline.ingest(vec![msg("a", "c1")]).unwrap_err();
        assert!(matches!(err, GateError::WriterClosed));
        // The failed delivery is not counted against the window.
        assert_eq!(pipeline.limiter().state("c1").unwrap().count, 0);
    }
}
