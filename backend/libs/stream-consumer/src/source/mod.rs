//! Message sources and commit strategies
//!
//! A [`MessageSource`] hands out cursors and batches. Positions are advanced
//! either implicitly by the fetch (commit-on-read) or explicitly through a
//! [`CursorCommitter`] once the whole batch has been dispatched.

use crate::cursor::{Batch, Cursor, CursorMode};
use crate::error::ConsumerResult;
use async_trait::async_trait;
use std::time::Duration;

pub mod http;
pub mod kafka;
pub mod memory;

pub use http::{HttpStreamSource, HttpStreamSourceConfig, StreamConnectDetails};
pub use kafka::{KafkaPartitionSource, KafkaSourceConfig};
pub use memory::InMemoryLog;

/// Ordered, partitioned log addressed by opaque cursors
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Create a cursor positioned according to `mode`
    ///
    /// # Errors
    ///
    /// `SourceUnavailable` if the log or group cannot be reached.
    async fn create_cursor(&self, mode: &CursorMode) -> ConsumerResult<Cursor>;

    /// Fetch up to `limit` messages starting at `cursor`
    ///
    /// Returns the messages in log order and the cursor immediately after the
    /// last one (or the unchanged position when nothing was available).
    /// `timeout` bounds how long the source may wait for data.
    async fn get_messages(
        &self,
        cursor: &Cursor,
        limit: usize,
        timeout: Duration,
    ) -> ConsumerResult<Batch>;

    /// Position stored by an earlier run's commits, when the source keeps one
    async fn committed_cursor(&self) -> ConsumerResult<Option<Cursor>> {
        Ok(None)
    }
}

/// Acknowledges a consumed position so that it survives restarts
#[async_trait]
pub trait CursorCommitter: Send + Sync {
    /// Commit everything before `next_cursor`
    async fn commit(&self, next_cursor: &Cursor) -> ConsumerResult<()>;
}

/// Commit strategy for sources whose fetch already advances the durable offset
#[derive(Debug, Clone, Copy, Default)]
pub struct CommitOnRead;

#[async_trait]
impl CursorCommitter for CommitOnRead {
    async fn commit(&self, _next_cursor: &Cursor) -> ConsumerResult<()> {
        Ok(())
    }
}
