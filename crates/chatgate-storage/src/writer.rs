// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched, deduplicating write-behind for accepted messages.
//!
//! [`BatchWriter::enqueue`] only appends to an in-memory channel. A single
//! background task stages what arrives and commits it to the
//! [`MessageStore`] in chunks of `batch_size`, or whatever is staged once
//! `flush_interval` has passed since the last flush. Each chunk is one
//! transaction; ids that already exist are skipped and counted.
//!
//! A failed chunk stays staged and is retried with exponential backoff. When
//! the attempts run out the task stops and the error surfaces through
//! [`BatchWriter::flush`], [`BatchWriter::shutdown`] and
//! [`BatchWriter::health`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chatgate_config::model::WriterConfig;
use chatgate_core::{
    Adapter, GateError, HealthStatus, InsertOutcome, Message, MessageStore, PersistedRecord,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Point-in-time writer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Messages accepted by `enqueue`.
    pub enqueued: u64,
    /// Rows written to the store.
    pub committed: u64,
    /// Messages skipped because their id was already stored.
    pub duplicates: u64,
    /// Successful flush transactions.
    pub flushes: u64,
    /// Failed flush attempts that were retried.
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    committed: AtomicU64,
    duplicates: AtomicU64,
    flushes: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> WriterStats {
        WriterStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// State visible to both the handle and the flush task.
#[derive(Default)]
struct Shared {
    /// Ids enqueued but not yet committed.
    pending: Mutex<HashSet<String>>,
    counters: Counters,
    retrying: AtomicBool,
    last_error: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

enum WriterCommand {
    Insert(Vec<Message>),
    Flush(oneshot::Sender<Result<InsertOutcome, GateError>>),
}

/// Handle to the background flush task.
///
/// Dropping the handle cancels the task, which still drains and commits
/// what it has. Call [`shutdown`](Self::shutdown) to wait for that and see
/// any error.
pub struct BatchWriter {
    store: Arc<dyn MessageStore>,
    tx: mpsc::UnboundedSender<WriterCommand>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<Result<(), GateError>>>>,
}

impl BatchWriter {
    /// Spawn the flush task on the current tokio runtime.
    pub fn start(store: Arc<dyn MessageStore>, config: &WriterConfig) -> Result<Self, GateError> {
        if config.batch_size == 0 {
            return Err(GateError::Config(
                "writer.batch_size must be greater than 0".to_string(),
            ));
        }
        if config.flush_interval().is_zero() {
            return Err(GateError::Config(
                "writer.flush_interval_ms must be greater than 0".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        let cancel = CancellationToken::new();
        let task = FlushTask {
            store: Arc::clone(&store),
            shared: Arc::clone(&shared),
            batch_size: config.batch_size,
            flush_interval: config.flush_interval(),
            max_attempts: config.max_flush_attempts.max(1),
            backoff: config.retry_backoff(),
            staged: Vec::new(),
        };
        let handle = tokio::spawn(task.run(rx, cancel.clone()));

        info!(
            batch_size = config.batch_size,
            flush_interval_ms = config.flush_interval_ms,
            store = store.name(),
            "batch writer started"
        );

        Ok(Self {
            store,
            tx,
            shared,
            cancel,
            task: Mutex::new(Some(handle)),
        })
    }

    /// Queue messages for persistence. Returns before they are durable.
    pub fn enqueue(&self, messages: Vec<Message>) -> Result<(), GateError> {
        if self.cancel.is_cancelled() {
            return Err(GateError::WriterClosed);
        }
        if messages.is_empty() {
            return Ok(());
        }

        let count = messages.len() as u64;
        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        lock(&self.shared.pending).extend(ids.iter().cloned());
        self.shared.counters.enqueued.fetch_add(count, Ordering::Relaxed);

        if self.tx.send(WriterCommand::Insert(messages)).is_err() {
            self.shared.counters.enqueued.fetch_sub(count, Ordering::Relaxed);
            let mut pending = lock(&self.shared.pending);
            for id in &ids {
                pending.remove(id);
            }
            return Err(GateError::WriterClosed);
        }
        Ok(())
    }

    /// Whether the id is staged or already committed.
    pub async fn exists(&self, message_id: &str) -> Result<bool, GateError> {
        // Commits land in the store before ids leave the pending set.
        if lock(&self.shared.pending).contains(message_id) {
            return Ok(true);
        }
        self.store.exists(message_id).await
    }

    /// Committed records, most recent first.
    pub async fn all(&self, limit: Option<u32>) -> Result<Vec<PersistedRecord>, GateError> {
        self.store.list_all(limit).await
    }

    /// Committed records of one conversation name, most recent first.
    pub async fn by_conversation(
        &self,
        conversation_name: &str,
        limit: Option<u32>,
    ) -> Result<Vec<PersistedRecord>, GateError> {
        self.store
            .list_by_conversation(conversation_name, limit)
            .await
    }

    /// Commit everything enqueued so far and report what the commit did.
    pub async fn flush(&self) -> Result<InsertOutcome, GateError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(reply))
            .map_err(|_| GateError::WriterClosed)?;
        response.await.map_err(|_| GateError::WriterClosed)?
    }

    /// Number of distinct ids enqueued but not yet committed.
    pub fn pending(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    pub fn stats(&self) -> WriterStats {
        self.shared.counters.snapshot()
    }

    pub fn health(&self) -> HealthStatus {
        let task = lock(&self.task);
        match task.as_ref() {
            None => HealthStatus::Unhealthy("batch writer shut down".to_string()),
            Some(handle) if handle.is_finished() => {
                let reason = lock(&self.shared.last_error)
                    .clone()
                    .unwrap_or_else(|| "flush task stopped".to_string());
                HealthStatus::Unhealthy(reason)
            }
            Some(_) if self.shared.retrying.load(Ordering::Relaxed) => {
                HealthStatus::Degraded("flush failing, retrying".to_string())
            }
            Some(_) => HealthStatus::Healthy,
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Stop accepting messages, commit everything queued, and wait for the task.
    ///
    /// Calling it again after it returned is a no-op.
    pub async fn shutdown(&self) -> Result<(), GateError> {
        self.cancel.cancel();
        let Some(handle) = lock(&self.task).take() else {
            return Ok(());
        };
        let result = handle
            .await
            .map_err(|e| GateError::Internal(format!("flush task panicked: {e}")))?;

        let stats = self.stats();
        info!(
            enqueued = stats.enqueued,
            committed = stats.committed,
            duplicates = stats.duplicates,
            flushes = stats.flushes,
            "batch writer stopped"
        );
        result
    }
}

impl Drop for BatchWriter {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The background task owning staged messages.
struct FlushTask {
    store: Arc<dyn MessageStore>,
    shared: Arc<Shared>,
    batch_size: usize,
    flush_interval: Duration,
    max_attempts: u32,
    backoff: Duration,
    staged: Vec<Message>,
}

impl FlushTask {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<WriterCommand>,
        cancel: CancellationToken,
    ) -> Result<(), GateError> {
        let result = self.serve(&mut rx, &cancel).await;
        if let Err(e) = &result {
            error!(error = %e, staged = self.staged.len(), "flush task stopped");
            *lock(&self.shared.last_error) = Some(e.to_string());
            lock(&self.shared.pending).clear();
        }
        result
    }

    async fn serve(
        &mut self,
        rx: &mut mpsc::UnboundedReceiver<WriterCommand>,
        cancel: &CancellationToken,
    ) -> Result<(), GateError> {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_flush = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(WriterCommand::Insert(batch)) => {
                        self.staged.extend(batch);
                        if self.staged.len() >= self.batch_size {
                            self.flush_full_batches().await?;
                        } else if last_flush.elapsed() >= self.flush_interval {
                            // A channel that is never empty keeps the ticker from being polled.
                            debug!(staged = self.staged.len(), "interval flush on insert");
                            self.flush_staged().await?;
                        } else {
                            continue;
                        }
                        ticker.reset();
                        last_flush = Instant::now();
                    }
                    Some(WriterCommand::Flush(reply)) => {
                        let result = self.flush_staged().await;
                        ticker.reset();
                        last_flush = Instant::now();
                        answer(reply, result)?;
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    last_flush = Instant::now();
                    if !self.staged.is_empty() {
                        debug!(staged = self.staged.len(), "interval flush");
                        self.flush_staged().await?;
                    }
                }
            }
        }

        // No new sends succeed after close; everything already queued is kept.
        rx.close();
        let mut waiters = Vec::new();
        while let Ok(command) = rx.try_recv() {
            match command {
                WriterCommand::Insert(batch) => self.staged.extend(batch),
                WriterCommand::Flush(reply) => waiters.push(reply),
            }
        }
        debug!(staged = self.staged.len(), "final flush");
        match self.flush_staged().await {
            Ok(outcome) => {
                for waiter in waiters {
                    let _ = waiter.send(Ok(outcome));
                }
                Ok(())
            }
            Err(e) => {
                for waiter in waiters {
                    let _ = waiter.send(Err(echo(&e)));
                }
                Err(e)
            }
        }
    }

    /// Commit whole `batch_size` chunks, leaving any remainder staged.
    async fn flush_full_batches(&mut self) -> Result<(), GateError> {
        while self.staged.len() >= self.batch_size {
            self.commit(&self.staged[..self.batch_size]).await?;
            self.staged.drain(..self.batch_size);
        }
        Ok(())
    }

    /// Commit everything staged, one transaction per chunk.
    async fn flush_staged(&mut self) -> Result<InsertOutcome, GateError> {
        let mut total = InsertOutcome::default();
        while !self.staged.is_empty() {
            let n = self.staged.len().min(self.batch_size);
            total.absorb(self.commit(&self.staged[..n]).await?);
            self.staged.drain(..n);
        }
        Ok(total)
    }

    async fn commit(&self, chunk: &[Message]) -> Result<InsertOutcome, GateError> {
        let mut attempt = 1;
        loop {
            match self.store.insert_batch(chunk).await {
                Ok(outcome) => {
                    self.shared.retrying.store(false, Ordering::Relaxed);
                    let counters = &self.shared.counters;
                    counters.committed.fetch_add(outcome.inserted as u64, Ordering::Relaxed);
                    counters.duplicates.fetch_add(outcome.duplicates as u64, Ordering::Relaxed);
                    counters.flushes.fetch_add(1, Ordering::Relaxed);

                    let mut pending = lock(&self.shared.pending);
                    for msg in chunk {
                        pending.remove(&msg.id);
                    }
                    debug!(
                        inserted = outcome.inserted,
                        duplicates = outcome.duplicates,
                        attempt,
                        "flush committed"
                    );
                    return Ok(outcome);
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.backoff.saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        batch = chunk.len(),
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "flush failed, retrying"
                    );
                    self.shared.retrying.store(true, Ordering::Relaxed);
                    self.shared.counters.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(GateError::FlushFailed {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}

/// Reply to a flush waiter, returning the error to the task if it is fatal.
fn answer(
    reply: oneshot::Sender<Result<InsertOutcome, GateError>>,
    result: Result<InsertOutcome, GateError>,
) -> Result<(), GateError> {
    match result {
        Ok(outcome) => {
            let _ = reply.send(Ok(outcome));
            Ok(())
        }
        Err(e) => {
            let _ = reply.send(Err(echo(&e)));
            Err(e)
        }
    }
}

/// A copy of a task error for a waiter; the original stays with the task.
fn echo(e: &GateError) -> GateError {
    match e {
        GateError::FlushFailed { attempts, source } => GateError::FlushFailed {
            attempts: *attempts,
            source: source.to_string().into(),
        },
        other => GateError::Internal(other.to_string()),
    }
}
