// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `chatgate ingest` command implementation.
//!
//! Reads JSON-lines messages, groups consecutive messages of one
//! conversation into a batch, and runs every batch through the pipeline.
//! Stops at end of input or on SIGINT/SIGTERM, draining the writer either way.

use std::path::Path;

use chatgate_config::model::ChatgateConfig;
use chatgate_core::{GateError, Message};
use chatgate_filter::Verdict;
use chatgate_pipeline::{Pipeline, install_signal_handler};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Totals printed when ingestion ends.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct IngestSummary {
    pub batches: u64,
    pub delivered: u64,
    pub released: u64,
    pub deferred: u64,
    pub invalid_batches: u64,
    pub skipped_lines: u64,
    pub committed: u64,
    pub duplicates: u64,
}

/// Collects consecutive messages of the same conversation.
#[derive(Debug, Default)]
pub struct ConversationBatcher {
    current: Vec<Message>,
}

impl ConversationBatcher {
    /// Add a message, returning the finished batch if the conversation changed.
    pub fn push(&mut self, msg: Message) -> Option<Vec<Message>> {
        let finished = match self.current.first() {
            Some(first) if first.conversation.key() != msg.conversation.key() => {
                Some(std::mem::take(&mut self.current))
            }
            _ => None,
        };
        self.current.push(msg);
        finished
    }

    /// The batch still being collected, if any.
    pub fn finish(&mut self) -> Option<Vec<Message>> {
        (!self.current.is_empty()).then(|| std::mem::take(&mut self.current))
    }
}

/// Run the `chatgate ingest` command.
///
/// Reads stdin when `input` is `None`.
pub async fn run_ingest(
    config: &ChatgateConfig,
    input: Option<&Path>,
) -> Result<IngestSummary, GateError> {
    let cancel = install_signal_handler();
    let summary = match input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                GateError::Config(format!("cannot open input {}: {e}", path.display()))
            })?;
            ingest_reader(config, file, cancel.clone()).await
        }
        None => ingest_reader(config, tokio::io::stdin(), cancel.clone()).await,
    };
    // Stop the signal handler task.
    cancel.cancel();
    summary
}

/// Ingest every JSON line of `reader` until EOF or `cancel`.
pub async fn ingest_reader<R>(
    config: &ChatgateConfig,
    reader: R,
    cancel: CancellationToken,
) -> Result<IngestSummary, GateError>
where
    R: AsyncRead + Unpin,
{
    let pipeline = Pipeline::open(config).await?;
    let mut summary = IngestSummary::default();
    let result = feed(&pipeline, reader, &cancel, &mut summary).await;

    // Drain even when reading failed, so accepted messages are not lost.
    let shutdown = pipeline.shutdown().await;
    let stats = pipeline.stats();
    summary.committed = stats.committed;
    summary.duplicates = stats.duplicates;
    result?;
    shutdown?;

    info!(
        batches = summary.batches,
        committed = summary.committed,
        deferred = summary.deferred,
        "ingest finished"
    );
    Ok(summary)
}

async fn feed<R>(
    pipeline: &Pipeline,
    reader: R,
    cancel: &CancellationToken,
    summary: &mut IngestSummary,
) -> Result<(), GateError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut batcher = ConversationBatcher::default();
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown signal received, stopping ingest");
                break;
            }
            line = lines.next_line() => line
                .map_err(|e| GateError::Internal(format!("cannot read input: {e}")))?,
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let msg: Message = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed message");
                summary.skipped_lines += 1;
                continue;
            }
        };
        if let Some(batch) = batcher.push(msg) {
            submit(pipeline, batch, summary)?;
        }
    }

    if let Some(batch) = batcher.finish() {
        submit(pipeline, batch, summary)?;
    }
    Ok(())
}

fn submit(
    pipeline: &Pipeline,
    batch: Vec<Message>,
    summary: &mut IngestSummary,
) -> Result<(), GateError> {
    let size = batch.len() as u64;
    summary.batches += 1;
    match pipeline.ingest(batch) {
        Ok(outcome) => {
            match outcome.verdict {
                Verdict::Deliver => summary.delivered += size,
                Verdict::Release => summary.released += size,
                Verdict::Defer => summary.deferred += size,
            }
            Ok(())
        }
        Err(GateError::InvalidBatch { message }) => {
            warn!(%message, "skipping invalid batch");
            summary.invalid_batches += 1;
            Ok(())
        }
        Err(e) => Err(e),
    }
}
