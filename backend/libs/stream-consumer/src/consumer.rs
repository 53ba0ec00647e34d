//! Cursor-driven consumer loop
//!
//! Each iteration fetches one batch from the current cursor, hands every
//! message to the handler in log order, commits, and only then replaces the
//! cursor with the batch's `next_cursor`. The loop is bounded by
//! `max_iterations` fetch attempts and stops early when the shutdown flag
//! flips to `true`.
//!
//! Delivery is at-least-once: a cancelled or uncommitted batch is fetched
//! again from the same cursor by the next run.

use crate::clock::{Clock, TokioClock};
use crate::cursor::{Batch, Cursor, CursorMode, Message};
use crate::error::{ConsumerError, ConsumerResult};
use crate::metrics;
use crate::source::{CommitOnRead, CursorCommitter, MessageSource};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Per-message callback invoked by the loop
///
/// A failure only affects the message it was returned for; the loop logs it
/// and moves on to the next message of the batch.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn on_message(&self, message: &Message) -> Result<(), Self::Error>;
}

/// What to do when the source rejects the current cursor
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InvalidCursorPolicy {
    /// End the run with [`StopReason::InvalidCursor`]
    #[default]
    Stop,
    /// Create a fresh cursor with the given mode and keep going
    Reinitialize(CursorMode),
}

/// Loop configuration
#[derive(Debug, Clone)]
pub struct ConsumerLoopConfig {
    /// Label used in logs and metrics
    pub name: String,
    /// Upper bound on fetch attempts for one run
    pub max_iterations: u32,
    /// Pause between iterations
    pub inter_batch_delay: Duration,
    /// Maximum messages per fetch
    pub batch_size: usize,
    /// Bound on a single cursor creation or fetch
    pub fetch_timeout: Duration,
    /// First backoff step after a failed fetch
    pub retry_backoff: Duration,
    /// Backoff ceiling
    pub max_retry_backoff: Duration,
    pub invalid_cursor_policy: InvalidCursorPolicy,
}

impl Default for ConsumerLoopConfig {
    fn default() -> Self {
        Self {
            name: "person-consumer".to_string(),
            max_iterations: 15,
            inter_batch_delay: Duration::from_secs(10),
            batch_size: 15,
            fetch_timeout: Duration::from_secs(10),
            retry_backoff: Duration::from_secs(1),
            max_retry_backoff: Duration::from_secs(60),
            invalid_cursor_policy: InvalidCursorPolicy::Stop,
        }
    }
}

impl ConsumerLoopConfig {
    /// Pause after `consecutive_failures` failed fetches in a row
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.inter_batch_delay;
        }

        let exponent = (consecutive_failures - 1).min(16);
        let backoff = self
            .retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_backoff);

        backoff.max(self.inter_batch_delay)
    }
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// All `max_iterations` fetch attempts were made
    Completed,
    /// The shutdown flag was raised
    Cancelled,
    /// The source rejected the cursor and the policy is `Stop`
    InvalidCursor,
    /// The source refused the request (credentials, permissions)
    Misconfigured,
}

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    /// Last committed position; resume from here
    pub final_cursor: Cursor,
    pub fetch_attempts: u32,
    /// Successful fetches, including empty ones
    pub batches: u32,
    pub messages_dispatched: u64,
    pub handler_failures: u64,
    pub fetch_failures: u32,
    pub commit_failures: u32,
    pub stop_reason: StopReason,
}

impl LoopReport {
    fn new(cursor: Cursor) -> Self {
        Self {
            final_cursor: cursor,
            fetch_attempts: 0,
            batches: 0,
            messages_dispatched: 0,
            handler_failures: 0,
            fetch_failures: 0,
            commit_failures: 0,
            stop_reason: StopReason::Completed,
        }
    }
}

/// Bounded, cancellable fetch → dispatch → commit → advance loop
pub struct ConsumerLoop {
    source: Arc<dyn MessageSource>,
    committer: Arc<dyn CursorCommitter>,
    clock: Arc<dyn Clock>,
    config: ConsumerLoopConfig,
    shutdown: watch::Receiver<bool>,
}

impl ConsumerLoop {
    /// Create a loop that relies on commit-on-read and the tokio clock
    pub fn new(
        source: Arc<dyn MessageSource>,
        config: ConsumerLoopConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            source,
            committer: Arc::new(CommitOnRead),
            clock: Arc::new(TokioClock),
            config,
            shutdown,
        }
    }

    /// Commit each batch explicitly once it has been dispatched
    pub fn with_committer(mut self, committer: Arc<dyn CursorCommitter>) -> Self {
        self.committer = committer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ConsumerLoopConfig {
        &self.config
    }

    /// Create the starting cursor
    ///
    /// A source that does not answer within `fetch_timeout` is reported as
    /// `SourceUnavailable`.
    pub async fn initialize_cursor(&self, mode: &CursorMode) -> ConsumerResult<Cursor> {
        let cursor = tokio::time::timeout(self.config.fetch_timeout, self.source.create_cursor(mode))
            .await
            .map_err(|_| {
                ConsumerError::SourceUnavailable(format!(
                    "cursor creation timed out after {:?}",
                    self.config.fetch_timeout
                ))
            })??;

        info!(consumer = %self.config.name, mode = %mode, cursor = %cursor, "Cursor initialized");
        Ok(cursor)
    }

    /// Cursor to resume from: the source's committed position, or a fresh
    /// cursor created with `fallback` when nothing has been committed yet
    pub async fn resume_cursor(&self, fallback: &CursorMode) -> ConsumerResult<Cursor> {
        let committed = tokio::time::timeout(self.config.fetch_timeout, self.source.committed_cursor())
            .await
            .map_err(|_| {
                ConsumerError::SourceUnavailable(format!(
                    "committed position lookup timed out after {:?}",
                    self.config.fetch_timeout
                ))
            })??;

        match committed {
            Some(cursor) => {
                info!(consumer = %self.config.name, cursor = %cursor, "Resuming from committed position");
                Ok(cursor)
            }
            None => self.initialize_cursor(fallback).await,
        }
    }

    /// Fetch up to `max_size` messages from `cursor`, bounded by `timeout`
    pub async fn fetch_batch(
        &self,
        cursor: &Cursor,
        max_size: usize,
        timeout: Duration,
    ) -> ConsumerResult<Batch> {
        tokio::time::timeout(timeout, self.source.get_messages(cursor, max_size, timeout))
            .await
            .map_err(|_| {
                ConsumerError::SourceUnavailable(format!("fetch timed out after {:?}", timeout))
            })?
    }

    /// Initialize a cursor with `mode`, then run
    pub async fn run_from<H>(&self, mode: &CursorMode, handler: &H) -> ConsumerResult<LoopReport>
    where
        H: MessageHandler + ?Sized,
    {
        let cursor = self.initialize_cursor(mode).await?;
        Ok(self.run(cursor, handler).await)
    }

    /// Resume from the committed position (see [`Self::resume_cursor`]), then run
    pub async fn run_resumed<H>(&self, fallback: &CursorMode, handler: &H) -> ConsumerResult<LoopReport>
    where
        H: MessageHandler + ?Sized,
    {
        let cursor = self.resume_cursor(fallback).await?;
        Ok(self.run(cursor, handler).await)
    }

    /// Run up to `max_iterations` iterations starting at `initial_cursor`
    ///
    /// Fetch failures never abort the run: the cursor is kept and the next
    /// iteration retries after a backoff. The early exits are cancellation,
    /// an invalid cursor under [`InvalidCursorPolicy::Stop`] and a source that
    /// refuses the request outright (`ConsumerError::Config`).
    pub async fn run<H>(&self, initial_cursor: Cursor, handler: &H) -> LoopReport
    where
        H: MessageHandler + ?Sized,
    {
        let name = self.config.name.as_str();
        let mut shutdown = self.shutdown.clone();
        let mut cursor = initial_cursor;
        let mut report = LoopReport::new(cursor.clone());
        let mut consecutive_failures = 0u32;

        info!(
            consumer = %name,
            cursor = %cursor,
            max_iterations = self.config.max_iterations,
            batch_size = self.config.batch_size,
            "Consumer loop started"
        );

        for iteration in 0..self.config.max_iterations {
            if *shutdown.borrow() {
                report.stop_reason = StopReason::Cancelled;
                break;
            }

            report.fetch_attempts += 1;

            match self
                .fetch_batch(&cursor, self.config.batch_size, self.config.fetch_timeout)
                .await
            {
                Ok(batch) => {
                    metrics::record_fetch(name, "ok");
                    consecutive_failures = 0;
                    report.batches += 1;

                    if *shutdown.borrow() {
                        info!(consumer = %name, "Shutdown requested before dispatch, batch left for redelivery");
                        report.stop_reason = StopReason::Cancelled;
                        break;
                    }

                    debug!(consumer = %name, iteration, messages = batch.len(), "Fetched batch");
                    self.dispatch(&batch, handler, &mut report).await;

                    if self.commit(&batch, &mut report).await {
                        cursor = batch.next_cursor;
                        report.final_cursor = cursor.clone();
                    }
                }
                Err(ConsumerError::InvalidCursor(reason)) => {
                    metrics::record_fetch(name, "invalid_cursor");
                    report.fetch_failures += 1;
                    warn!(consumer = %name, cursor = %cursor, reason = %reason, "Cursor rejected by source");

                    match &self.config.invalid_cursor_policy {
                        InvalidCursorPolicy::Stop => {
                            report.stop_reason = StopReason::InvalidCursor;
                            break;
                        }
                        InvalidCursorPolicy::Reinitialize(mode) => {
                            match self.initialize_cursor(mode).await {
                                Ok(fresh) => {
                                    consecutive_failures = 0;
                                    cursor = fresh;
                                    report.final_cursor = cursor.clone();
                                }
                                Err(e) => {
                                    consecutive_failures += 1;
                                    report.fetch_failures += 1;
                                    error!(consumer = %name, mode = %mode, error = %e, "Cursor reinitialization failed");
                                }
                            }
                        }
                    }
                }
                Err(ConsumerError::Config(reason)) => {
                    metrics::record_fetch(name, "config");
                    report.fetch_failures += 1;
                    error!(consumer = %name, cursor = %cursor, reason = %reason, "Source refused fetch, stopping");
                    report.stop_reason = StopReason::Misconfigured;
                    break;
                }
                Err(e) => {
                    metrics::record_fetch(name, "unavailable");
                    consecutive_failures += 1;
                    report.fetch_failures += 1;
                    warn!(
                        consumer = %name,
                        cursor = %cursor,
                        consecutive_failures,
                        error = %e,
                        "Fetch failed, keeping cursor"
                    );
                }
            }

            if iteration + 1 < self.config.max_iterations {
                let delay = self.config.delay_after(consecutive_failures);
                tokio::select! {
                    _ = self.clock.sleep(delay) => {}
                    _ = wait_for_shutdown(&mut shutdown) => {}
                }
            }
        }

        if report.stop_reason == StopReason::Completed && *shutdown.borrow() {
            report.stop_reason = StopReason::Cancelled;
        }

        info!(
            consumer = %name,
            cursor = %report.final_cursor,
            fetch_attempts = report.fetch_attempts,
            messages = report.messages_dispatched,
            handler_failures = report.handler_failures,
            stop_reason = ?report.stop_reason,
            "Consumer loop finished"
        );

        report
    }

    async fn dispatch<H>(&self, batch: &Batch, handler: &H, report: &mut LoopReport)
    where
        H: MessageHandler + ?Sized,
    {
        let name = self.config.name.as_str();

        for message in &batch.messages {
            report.messages_dispatched += 1;

            match handler.on_message(message).await {
                Ok(()) => metrics::record_message(name, true),
                Err(e) => {
                    metrics::record_message(name, false);
                    report.handler_failures += 1;
                    warn!(
                        consumer = %name,
                        partition = %message.partition,
                        offset = message.offset,
                        key = %message.key_str(),
                        error = %e,
                        "Message handler failed"
                    );
                }
            }
        }
    }

    /// Returns whether the cursor may advance past `batch`
    async fn commit(&self, batch: &Batch, report: &mut LoopReport) -> bool {
        if batch.is_empty() {
            return true;
        }

        match self.committer.commit(&batch.next_cursor).await {
            Ok(()) => true,
            Err(e) => {
                metrics::record_commit_failure(&self.config.name);
                report.commit_failures += 1;
                error!(
                    consumer = %self.config.name,
                    next_cursor = %batch.next_cursor,
                    error = %e,
                    "Commit failed, batch will be redelivered"
                );
                false
            }
        }
    }
}

/// Resolves once the flag is `true`; never resolves if the sender is gone
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let sender_dropped = shutdown.wait_for(|stop| *stop).await.is_err();
    if sender_dropped {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConsumerLoopConfig::default();
        assert_eq!(config.max_iterations, 15);
        assert_eq!(config.batch_size, 15);
        assert_eq!(config.inter_batch_delay, Duration::from_secs(10));
        assert_eq!(config.invalid_cursor_policy, InvalidCursorPolicy::Stop);
    }

    #[test]
    fn test_backoff_growth() {
        let config = ConsumerLoopConfig {
            inter_batch_delay: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(50),
            max_retry_backoff: Duration::from_secs(1),
            ..Default::default()
        };

        assert_eq!(config.delay_after(0), Duration::from_millis(100));
        // never shorter than the regular pause
        assert_eq!(config.delay_after(1), Duration::from_millis(100));
        assert_eq!(config.delay_after(2), Duration::from_millis(100));
        assert_eq!(config.delay_after(3), Duration::from_millis(200));
        assert_eq!(config.delay_after(4), Duration::from_millis(400));
        assert_eq!(config.delay_after(5), Duration::from_millis(800));
        assert_eq!(config.delay_after(6), Duration::from_secs(1));
        assert_eq!(config.delay_after(60), Duration::from_secs(1));
    }
}
