// SPDX-FileCopyrightText: 2026 Chatgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiter with deferral and hard-drop release.
//!
//! Each conversation gets a window of `window` length that admits at most
//! `max_messages` messages. A batch that would overflow the window is parked in
//! the [`DeferQueue`] and the conversation enters a deferral episode. The
//! episode ends only when a batch arrives more than `limit_time` after it
//! began: state is wiped and that batch passes through whatever its size.
//!
//! Every read-modify-write on a conversation's state runs under that
//! conversation's map entry lock, so concurrent calls for the same
//! conversation never interleave.

use std::sync::Arc;

use chatgate_config::model::FilterConfig;
use chatgate_core::{ConversationRef, GateError, Message};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::defer::{DeferQueue, DeferredBatch};
use crate::state::{ConversationState, ConversationStatus};

/// Limits applied to every conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    /// How long a deferral episode lasts before the gate reopens.
    pub limit_time: TimeDelta,
    /// Quota per window.
    pub max_messages: usize,
    /// Window length.
    pub window: TimeDelta,
}

impl RatePolicy {
    /// Builds a policy, rejecting zero or out-of-range values.
    pub fn from_config(config: &FilterConfig) -> Result<Self, GateError> {
        if config.max_messages_per_window == 0 {
            return Err(GateError::Config(
                "filter.max_messages_per_window must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            limit_time: positive_seconds("filter.limit_time_secs", config.limit_time_secs)?,
            max_messages: config.max_messages_per_window,
            window: positive_seconds("filter.window_secs", config.window_secs)?,
        })
    }
}

fn positive_seconds(name: &str, secs: u64) -> Result<TimeDelta, GateError> {
    if secs == 0 {
        return Err(GateError::Config(format!("{name} must be greater than 0")));
    }
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| GateError::Config(format!("{name} of {secs}s is out of range")))
}

/// What the limiter decided for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Within quota; the batch is delivered and counted.
    Deliver,
    /// The deferral episode expired; state was reset and the batch delivered uncounted.
    Release,
    /// Over quota; the batch was parked in the defer queue.
    Defer,
}

/// A verdict together with the messages to hand downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub verdict: Verdict,
    /// The delivered batch; empty when deferred.
    pub messages: Vec<Message>,
}

/// Per-conversation sliding-window rate limiter.
///
/// State and the defer queue belong to the instance, so independent
/// pipelines (one per profile, say) never observe each other's traffic.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RatePolicy,
    states: DashMap<String, ConversationState>,
    deferred: Arc<DeferQueue>,
}

impl RateLimiter {
    /// Create a limiter from configuration with an empty defer queue.
    pub fn new(config: &FilterConfig) -> Result<Self, GateError> {
        Ok(Self::with_policy(RatePolicy::from_config(config)?))
    }

    pub fn with_policy(policy: RatePolicy) -> Self {
        Self {
            policy,
            states: DashMap::new(),
            deferred: Arc::new(DeferQueue::new()),
        }
    }

    pub fn policy(&self) -> &RatePolicy {
        &self.policy
    }

    /// The queue that receives deferred batches.
    pub fn defer_queue(&self) -> &Arc<DeferQueue> {
        &self.deferred
    }

    /// Filters a batch at the current time, returning what may be delivered.
    ///
    /// An empty result means the batch was deferred, not lost.
    pub fn apply(&self, messages: Vec<Message>) -> Result<Vec<Message>, GateError> {
        Ok(self.apply_at(messages, Utc::now())?.messages)
    }

    /// Filters a batch as if observed at `now`.
    pub fn apply_at(
        &self,
        messages: Vec<Message>,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError> {
        let mut delivered = Vec::new();
        let verdict = self.apply_with(messages, now, |batch| {
            delivered = batch;
            Ok(())
        })?;
        Ok(Decision {
            verdict,
            messages: delivered,
        })
    }

    /// Filters a batch and hands any delivered messages to `deliver` while the
    /// conversation is still locked.
    ///
    /// Accepted batches of one conversation therefore reach `deliver` in call
    /// order. `deliver` must not call back into this limiter. If it fails, the
    /// conversation's state is left as it was before the batch arrived: a
    /// [`Verdict::Deliver`] batch is not counted and a [`Verdict::Release`]
    /// does not end the deferral episode.
    ///
    /// Empty input is a no-op. A blank conversation id, or messages from more
    /// than one conversation, fail with [`GateError::InvalidBatch`] before any
    /// state is touched.
    pub fn apply_with<F>(
        &self,
        messages: Vec<Message>,
        now: DateTime<Utc>,
        deliver: F,
    ) -> Result<Verdict, GateError>
    where
        F: FnOnce(Vec<Message>) -> Result<(), GateError>,
    {
        if messages.is_empty() {
            return Ok(Verdict::Deliver);
        }
        let conversation = conversation_of(&messages)?.clone();
        let key = conversation.key().to_string();
        let batch = messages.len();

        let mut state = self
            .states
            .entry(key.clone())
            .or_insert_with(|| ConversationState::new(now));

        if now - state.window_start >= self.policy.window {
            state.window_start = now;
            state.count = 0;
        }

        if let Some(since) = state.defer_since
            && now - since > self.policy.limit_time
        {
            let episode = state.clone();
            state.reset(now);
            info!(
                conversation = %key,
                batch,
                stale_deferred = self.deferred.pending_for(&key),
                "deferral expired, conversation released"
            );
            if let Err(e) = deliver(messages) {
                *state = episode;
                return Err(e);
            }
            return Ok(Verdict::Release);
        }

        if state.count + batch > self.policy.max_messages {
            if state.defer_since.is_none() {
                state.defer_since = Some(now);
                warn!(
                    conversation = %key,
                    count = state.count,
                    batch,
                    quota = self.policy.max_messages,
                    "conversation over quota, deferring"
                );
            } else {
                debug!(conversation = %key, batch, "conversation still over quota");
            }
            self.deferred.push(DeferredBatch {
                conversation,
                messages,
                observed_at: now,
            });
            return Ok(Verdict::Defer);
        }

        let previous_seen = state.last_seen;
        state.count += batch;
        state.last_seen = Some(now);
        debug!(conversation = %key, batch, count = state.count, "batch delivered");

        if let Err(e) = deliver(messages) {
            state.count -= batch;
            state.last_seen = previous_seen;
            return Err(e);
        }
        Ok(Verdict::Deliver)
    }

    /// Snapshot of a conversation's state, if it has been seen.
    pub fn state(&self, key: &str) -> Option<ConversationState> {
        self.states.get(key).map(|s| s.clone())
    }

    /// Unknown conversations are [`ConversationStatus::Normal`].
    pub fn status(&self, key: &str) -> ConversationStatus {
        self.states
            .get(key)
            .map(|s| s.status())
            .unwrap_or(ConversationStatus::Normal)
    }

    /// Ends a conversation's deferral episode and window early.
    ///
    /// Returns `false` if the conversation had no state. Queued deferred
    /// batches are left untouched.
    pub fn reset(&self, key: &str) -> bool {
        let removed = self.states.remove(key).is_some();
        if removed {
            info!(conversation = %key, "conversation state reset");
        }
        removed
    }

    /// Number of conversations with state.
    pub fn tracked_conversations(&self) -> usize {
        self.states.len()
    }
}

/// The conversation every message of a non-empty batch belongs to.
fn conversation_of(messages: &[Message]) -> Result<&ConversationRef, GateError> {
    let conversation = &messages[0].conversation;
    if !conversation.is_valid() {
        return Err(GateError::InvalidBatch {
            message: format!("message `{}` has a blank conversation id", messages[0].id),
        });
    }
    if let Some(stray) = messages
        .iter()
        .find(|m| m.conversation.key() != conversation.key())
    {
        return Err(GateError::InvalidBatch {
            message: format!(
                "batch for conversation `{}` contains message `{}` from `{}`",
                conversation.key(),
                stray.id,
                stray.conversation.key()
            ),
        });
    }
    Ok(conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::Direction;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + TimeDelta::seconds(secs)
    }

    fn limiter() -> RateLimiter {
        RateLimiter::new(&FilterConfig {
            limit_time_secs: 3600,
            max_messages_per_window: 10,
            window_secs: 60,
        })
        .unwrap()
    }

    fn batch(conv: &str, range: std::ops::RangeInclusive<u32>) -> Vec<Message> {
        let conversation = ConversationRef::new(conv, format!("{conv} name"));
        range
            .map(|i| Message {
                id: format!("{conv}-m{i}"),
                conversation: conversation.clone(),
                raw_data: format!("message {i}"),
                data_type: "text".into(),
                direction: if i % 2 == 0 {
                    Direction::Outbound
                } else {
                    Direction::Inbound
                },
                captured_at: t0(),
            })
            .collect()
    }

    #[test]
    fn zero_window_rejected_at_construction() {
        let err = RateLimiter::new(&FilterConfig {
            window_secs: 0,
            ..FilterConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, GateError::Config(m) if m.contains("window_secs")));
    }

    #[test]
    fn empty_batch_is_noop() {
        let limiter = limiter();
        let decision = limiter.apply_at(Vec::new(), t0()).unwrap();
        assert_eq!(decision.verdict, Verdict::Deliver);
        assert!(decision.messages.is_empty());
        assert_eq!(limiter.tracked_conversations(), 0);
    }

    #[test]
    fn mixed_conversations_fail_fast() {
        let limiter = limiter();
        let mut messages = batch("c1", 1..=2);
        messages.extend(batch("c2", 3..=3));
        let err = limiter.apply_at(messages, t0()).unwrap_err();
        assert!(matches!(err, GateError::InvalidBatch { .. }));
        assert_eq!(limiter.tracked_conversations(), 0);
    }

    #[test]
    fn blank_conversation_fails_fast() {
        let limiter = limiter();
        let err = limiter.apply_at(batch("  ", 1..=1), t0()).unwrap_err();
        assert!(matches!(err, GateError::InvalidBatch { message } if message.contains("blank")));
    }

    #[test]
    fn full_quota_then_one_more_is_deferred() {
        let limiter = limiter();
        let first = limiter.apply_at(batch("c1", 1..=10), t0()).unwrap();
        assert_eq!(first.verdict, Verdict::Deliver);
        assert_eq!(first.messages.len(), 10);

        let second = limiter.apply_at(batch("c1", 11..=11), at(1)).unwrap();
        assert_eq!(second.verdict, Verdict::Defer);
        assert!(second.messages.is_empty());
        assert_eq!(limiter.defer_queue().len(), 1);
        assert_eq!(limiter.status("c1"), ConversationStatus::Deferred);
    }

    #[test]
    fn walkthrough_window_reset_keeps_deferral() {
        let limiter = limiter();

        let d = limiter.apply_at(batch("C1", 1..=6), t0()).unwrap();
        assert_eq!(d.messages.len(), 6);
        assert_eq!(limiter.state("C1").unwrap().count, 6);

        let d = limiter.apply_at(batch("C1", 7..=9), at(10)).unwrap();
        assert_eq!(d.verdict, Verdict::Deliver);
        assert_eq!(limiter.state("C1").unwrap().count, 9);

        let d = limiter.apply_at(batch("C1", 10..=11), at(20)).unwrap();
        assert_eq!(d.verdict, Verdict::Defer);
        assert_eq!(limiter.defer_queue().len(), 1);
        let state = limiter.state("C1").unwrap();
        assert_eq!(state.count, 9);
        assert_eq!(state.defer_since, Some(at(20)));

        let d = limiter.apply_at(batch("C1", 12..=12), at(65)).unwrap();
        assert_eq!(d.verdict, Verdict::Deliver);
        assert_eq!(d.messages[0].id, "C1-m12");
        let state = limiter.state("C1").unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.window_start, at(65));
        assert_eq!(state.defer_since, Some(at(20)));
        assert_eq!(state.last_seen, Some(at(65)));
    }

    #[test]
    fn deferral_holds_until_limit_time_then_releases_whole_batch() {
        let limiter = limiter();
        limiter.apply_at(batch("c1", 1..=10), t0()).unwrap();
        let deferred = limiter.apply_at(batch("c1", 11..=12), at(5)).unwrap();
        assert_eq!(deferred.verdict, Verdict::Defer);

        // Exactly LimitTime after the episode began is still gated.
        let still = limiter.apply_at(batch("c1", 13..=30), at(5 + 3600)).unwrap();
        assert_eq!(still.verdict, Verdict::Defer);
        assert_eq!(limiter.defer_queue().len(), 2);

        // Past LimitTime the batch passes unfiltered, even far over quota.
        let released = limiter
            .apply_at(batch("c1", 31..=55), at(5 + 3601))
            .unwrap();
        assert_eq!(released.verdict, Verdict::Release);
        assert_eq!(released.messages.len(), 25);
        assert_eq!(
            limiter.state("c1").unwrap(),
            ConversationState::new(at(5 + 3601))
        );
        assert_eq!(limiter.status("c1"), ConversationStatus::Normal);

        // Queued batches are not touched by the release.
        assert_eq!(limiter.defer_queue().pending_for("c1"), 2);
    }

    #[test]
    fn under_quota_batches_pass_during_deferral() {
        let limiter = limiter();
        limiter.apply_at(batch("c1", 1..=8), t0()).unwrap();
        assert_eq!(
            limiter.apply_at(batch("c1", 9..=11), at(1)).unwrap().verdict,
            Verdict::Defer
        );
        // 8 + 2 fits, so it is delivered even though the episode is open.
        let d = limiter.apply_at(batch("c1", 12..=13), at(2)).unwrap();
        assert_eq!(d.verdict, Verdict::Deliver);
        let state = limiter.state("c1").unwrap();
        assert_eq!(state.count, 10);
        assert_eq!(state.defer_since, Some(at(1)));
    }

    #[test]
    fn conversations_are_independent() {
        let limiter = limiter();
        limiter.apply_at(batch("a", 1..=10), t0()).unwrap();
        assert_eq!(
            limiter.apply_at(batch("a", 11..=11), t0()).unwrap().verdict,
            Verdict::Defer
        );
        assert_eq!(
            limiter.apply_at(batch("b", 1..=10), t0()).unwrap().verdict,
            Verdict::Deliver
        );
        assert_eq!(limiter.tracked_conversations(), 2);
    }

    #[test]
    fn separate_limiters_share_nothing() {
        let one = limiter();
        let two = limiter();
        one.apply_at(batch("c1", 1..=10), t0()).unwrap();
        one.apply_at(batch("c1", 11..=11), t0()).unwrap();
        assert_eq!(one.defer_queue().len(), 1);
        assert!(two.defer_queue().is_empty());
        assert_eq!(
            two.apply_at(batch("c1", 1..=10), t0()).unwrap().verdict,
            Verdict::Deliver
        );
    }

    #[test]
    fn external_reset_ends_episode() {
        let limiter = limiter();
        limiter.apply_at(batch("c1", 1..=10), t0()).unwrap();
        limiter.apply_at(batch("c1", 11..=11), at(1)).unwrap();
        assert!(limiter.reset("c1"));
        assert!(!limiter.reset("c1"));
        assert_eq!(limiter.status("c1"), ConversationStatus::Normal);
        assert_eq!(
            limiter.apply_at(batch("c1", 12..=21), at(2)).unwrap().verdict,
            Verdict::Deliver
        );
    }

    #[test]
    fn failed_delivery_is_not_counted() {
        let limiter = limiter();
        let err = limiter
            .apply_with(batch("c1", 1..=4), t0(), |_| Err(GateError::WriterClosed))
            .unwrap_err();
        assert!(matches!(err, GateError::WriterClosed));
        let state = limiter.state("c1").unwrap();
        assert_eq!(state.count, 0);
        assert!(state.last_seen.is_none());
    }

    #[test]
    fn failed_release_keeps_deferral_episode() {
        let limiter = limiter();
        limiter.apply_at(batch("c1", 1..=10), t0()).unwrap();
        limiter.apply_at(batch("c1", 11..=11), at(1)).unwrap();
        let before = limiter.state("c1").unwrap();

        let err = limiter
            .apply_with(batch("c1", 12..=20), at(4000), |_| {
                Err(GateError::WriterClosed)
            })
            .unwrap_err();
        assert!(matches!(err, GateError::WriterClosed));
        assert_eq!(limiter.status("c1"), ConversationStatus::Deferred);
        assert_eq!(limiter.state("c1").unwrap().defer_since, before.defer_since);

        // The next attempt still qualifies for release.
        let released = limiter.apply_at(batch("c1", 12..=20), at(4001)).unwrap();
        assert_eq!(released.verdict, Verdict::Release);
        assert_eq!(released.messages.len(), 9);
    }

    #[test]
    fn concurrent_callers_never_exceed_quota() {
        const THREADS: usize = 8;
        const BATCHES: u32 = 5;
        const SIZE: u32 = 3;

        let limiter = Arc::new(limiter());
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    let mut delivered = 0usize;
                    for b in 0..BATCHES {
                        let first = (t as u32 * BATCHES + b) * SIZE;
                        let d = limiter
                            .apply_at(batch("shared", first..=first + SIZE - 1), t0())
                            .unwrap();
                        delivered += d.messages.len();
                    }
                    delivered
                })
            })
            .collect();
        let delivered: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        // 10 / 3 leaves room for three whole batches.
        assert_eq!(delivered, 9);
        let state = limiter.state("shared").unwrap();
        assert_eq!(state.count, delivered);
        assert!(state.count <= limiter.policy().max_messages);

        let deferred: usize = limiter
            .defer_queue()
            .drain()
            .iter()
            .map(|b| b.messages.len())
            .sum();
        assert_eq!(deferred + delivered, THREADS * (BATCHES * SIZE) as usize);
    }

    #[test]
    fn apply_uses_wall_clock() {
        let limiter = limiter();
        let delivered = limiter.apply(batch("c1", 1..=3)).unwrap();
        assert_eq!(delivered.len(), 3);
        assert_eq!(limiter.apply(batch("c1", 4..=11)).unwrap().len(), 0);
    }

    proptest! {
        #[test]
        fn count_never_exceeds_quota(steps in prop::collection::vec((0i64..90, 1u32..8), 1..60)) {
            let limiter = RateLimiter::new(&FilterConfig {
                limit_time_secs: 120,
                max_messages_per_window: 10,
                window_secs: 60,
            }).unwrap();
            let mut clock = 0i64;
            let mut next_id = 0u32;
            for (advance, size) in steps {
                clock += advance;
                let messages = batch("p", next_id..=next_id + size - 1);
                next_id += size;
                let decision = limiter.apply_at(messages, at(clock)).unwrap();
                let state = limiter.state("p").unwrap();
                prop_assert!(state.count <= 10);
                if decision.verdict == Verdict::Defer {
                    prop_assert!(decision.messages.is_empty());
                    prop_assert!(state.defer_since.is_some());
                } else {
                    prop_assert_eq!(decision.messages.len(), size as usize);
                }
            }
        }
    }
}
