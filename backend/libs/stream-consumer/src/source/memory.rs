//! In-process log used by tests and local pipelines
//!
//! Cursor tokens look like `mem:0=3;1=0`: the next offset to read for every
//! partition the cursor covers. Fetching twice from the same token returns the
//! same messages, which is what at-least-once redelivery relies on.

use super::MessageSource;
use crate::cursor::{Batch, Cursor, CursorMode, Message};
use crate::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

const TOKEN_PREFIX: &str = "mem:";

#[derive(Debug, Clone)]
struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Partition {
    /// Offset of `entries[0]`; grows when old entries are trimmed
    base: i64,
    entries: Vec<Entry>,
}

impl Partition {
    fn end(&self) -> i64 {
        self.base + self.entries.len() as i64
    }
}

/// Append-only, multi-partition log held in memory
#[derive(Debug, Default)]
pub struct InMemoryLog {
    partitions: RwLock<BTreeMap<String, Partition>>,
    pending_failures: AtomicU32,
    fetches: AtomicU64,
}

impl InMemoryLog {
    /// Create a log with the given partitions
    pub fn new<I, S>(partitions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let partitions = partitions
            .into_iter()
            .map(|p| (p.into(), Partition::default()))
            .collect();

        Self {
            partitions: RwLock::new(partitions),
            ..Default::default()
        }
    }

    /// Single partition named `"0"`
    pub fn single_partition() -> Self {
        Self::new(["0"])
    }

    /// Append a message stamped with the current time; returns its offset
    pub async fn append(
        &self,
        partition: &str,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> i64 {
        self.append_at(partition, key, value, Utc::now()).await
    }

    /// Append a message with an explicit timestamp; returns its offset
    pub async fn append_at(
        &self,
        partition: &str,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        timestamp: DateTime<Utc>,
    ) -> i64 {
        let mut partitions = self.partitions.write().await;
        let part = partitions.entry(partition.to_string()).or_default();
        let offset = part.end();
        part.entries.push(Entry {
            key: key.into(),
            value: value.into(),
            timestamp,
        });
        offset
    }

    /// Drop everything before `offset` (retention); cursors pointing there become invalid
    pub async fn trim_before(&self, partition: &str, offset: i64) {
        let mut partitions = self.partitions.write().await;
        if let Some(part) = partitions.get_mut(partition) {
            let cut = (offset - part.base).clamp(0, part.entries.len() as i64) as usize;
            part.entries.drain(..cut);
            part.base += cut as i64;
        }
    }

    /// Make the next `count` fetches fail with `SourceUnavailable`
    pub fn fail_next_fetches(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of `get_messages` calls so far (including failed ones)
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Total retained messages across partitions
    pub async fn len(&self) -> usize {
        self.partitions
            .read()
            .await
            .values()
            .map(|p| p.entries.len())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn encode(positions: &BTreeMap<String, i64>) -> Cursor {
        let body = positions
            .iter()
            .map(|(p, o)| format!("{}={}", p, o))
            .collect::<Vec<_>>()
            .join(";");
        Cursor::new(format!("{}{}", TOKEN_PREFIX, body))
    }

    fn decode(cursor: &Cursor) -> ConsumerResult<BTreeMap<String, i64>> {
        let body = cursor
            .as_str()
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| ConsumerError::InvalidCursor(format!("foreign cursor '{}'", cursor)))?;

        let mut positions = BTreeMap::new();
        for part in body.split(';').filter(|s| !s.is_empty()) {
            let (partition, offset) = part
                .split_once('=')
                .ok_or_else(|| ConsumerError::InvalidCursor(format!("malformed cursor '{}'", cursor)))?;
            let offset: i64 = offset
                .parse()
                .map_err(|_| ConsumerError::InvalidCursor(format!("malformed cursor '{}'", cursor)))?;
            positions.insert(partition.to_string(), offset);
        }

        if positions.is_empty() {
            return Err(ConsumerError::InvalidCursor(format!(
                "cursor '{}' covers no partition",
                cursor
            )));
        }

        Ok(positions)
    }
}

#[async_trait]
impl MessageSource for InMemoryLog {
    async fn create_cursor(&self, mode: &CursorMode) -> ConsumerResult<Cursor> {
        let partitions = self.partitions.read().await;

        let positions: BTreeMap<String, i64> = match mode {
            CursorMode::Earliest => partitions
                .iter()
                .map(|(name, p)| (name.clone(), p.base))
                .collect(),
            CursorMode::Latest => partitions
                .iter()
                .map(|(name, p)| (name.clone(), p.end()))
                .collect(),
            CursorMode::AfterOffset { partition, offset } => {
                let part = partitions.get(partition).ok_or_else(|| {
                    ConsumerError::InvalidCursor(format!("unknown partition '{}'", partition))
                })?;
                let next = offset + 1;
                if next < part.base || next > part.end() {
                    return Err(ConsumerError::InvalidCursor(format!(
                        "offset {} outside retained range [{}, {})",
                        offset,
                        part.base,
                        part.end()
                    )));
                }
                BTreeMap::from([(partition.clone(), next)])
            }
            CursorMode::AtTime { time } => partitions
                .iter()
                .map(|(name, p)| {
                    let idx = p
                        .entries
                        .iter()
                        .position(|e| e.timestamp >= *time)
                        .unwrap_or(p.entries.len());
                    (name.clone(), p.base + idx as i64)
                })
                .collect(),
        };

        if positions.is_empty() {
            return Err(ConsumerError::SourceUnavailable(
                "log has no partitions".to_string(),
            ));
        }

        Ok(Self::encode(&positions))
    }

    async fn get_messages(
        &self,
        cursor: &Cursor,
        limit: usize,
        _timeout: Duration,
    ) -> ConsumerResult<Batch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(ConsumerError::SourceUnavailable(
                "injected fetch failure".to_string(),
            ));
        }

        let mut positions = Self::decode(cursor)?;
        let partitions = self.partitions.read().await;
        let mut messages = Vec::new();

        for (name, next) in positions.iter_mut() {
            let part = partitions.get(name).ok_or_else(|| {
                ConsumerError::InvalidCursor(format!("unknown partition '{}'", name))
            })?;
            if *next < part.base || *next > part.end() {
                return Err(ConsumerError::InvalidCursor(format!(
                    "offset {} of partition {} no longer retained",
                    next, name
                )));
            }

            while messages.len() < limit && *next < part.end() {
                let entry = &part.entries[(*next - part.base) as usize];
                messages.push(Message::new(
                    entry.key.clone(),
                    entry.value.clone(),
                    name.clone(),
                    *next,
                ));
                *next += 1;
            }
        }

        Ok(Batch {
            messages,
            next_cursor: Self::encode(&positions),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn test_earliest_on_empty_log_returns_empty_batch() {
        let log = InMemoryLog::single_partition();
        let cursor = log.create_cursor(&CursorMode::Earliest).await.unwrap();

        let batch = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.next_cursor, cursor);
    }

    #[tokio::test]
    async fn test_fetch_is_repeatable_from_same_cursor() {
        let log = InMemoryLog::single_partition();
        log.append("0", "A", "1").await;
        log.append("0", "B", "2").await;

        let cursor = log.create_cursor(&CursorMode::Earliest).await.unwrap();
        let first = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();
        let second = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_ne!(first.next_cursor, cursor);
    }

    #[tokio::test]
    async fn test_limit_bounds_batch() {
        let log = InMemoryLog::single_partition();
        for i in 0..5 {
            log.append("0", format!("k{}", i), "v").await;
        }

        let cursor = log.create_cursor(&CursorMode::Earliest).await.unwrap();
        let batch = log.get_messages(&cursor, 2, TIMEOUT).await.unwrap();
        assert_eq!(batch.len(), 2);

        let rest = log.get_messages(&batch.next_cursor, 10, TIMEOUT).await.unwrap();
        let offsets: Vec<i64> = rest.messages.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_latest_skips_existing_messages() {
        let log = InMemoryLog::single_partition();
        log.append("0", "old", "1").await;

        let cursor = log.create_cursor(&CursorMode::Latest).await.unwrap();
        log.append("0", "new", "2").await;

        let batch = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.messages[0].key, b"new".to_vec());
    }

    #[tokio::test]
    async fn test_after_offset_and_at_time() {
        let log = InMemoryLog::new(["0", "1"]);
        let t0 = Utc::now();
        for i in 0..6 {
            log.append_at("0", format!("k{}", i), "v", t0 + chrono::Duration::seconds(i))
                .await;
        }

        let cursor = log
            .create_cursor(&CursorMode::after_offset("0", 3))
            .await
            .unwrap();
        let batch = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();
        assert_eq!(batch.messages.first().map(|m| m.offset), Some(4));

        let cursor = log
            .create_cursor(&CursorMode::at_time(t0 + chrono::Duration::seconds(2)))
            .await
            .unwrap();
        let batch = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap();
        assert_eq!(batch.messages.first().map(|m| m.offset), Some(2));
        assert_eq!(batch.len(), 4);
    }

    #[tokio::test]
    async fn test_trimmed_cursor_is_invalid() {
        let log = InMemoryLog::single_partition();
        for _ in 0..4 {
            log.append("0", "k", "v").await;
        }
        let cursor = log.create_cursor(&CursorMode::Earliest).await.unwrap();
        log.trim_before("0", 2).await;

        let err = log.get_messages(&cursor, 10, TIMEOUT).await.unwrap_err();
        assert!(err.requires_reinitialize());

        let err = log
            .get_messages(&Cursor::new("kafka/0@1"), 10, TIMEOUT)
            .await
            .unwrap_err();
        assert!(err.requires_reinitialize());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let log = InMemoryLog::single_partition();
        let cursor = log.create_cursor(&CursorMode::Earliest).await.unwrap();
        log.fail_next_fetches(1);

        assert!(log.get_messages(&cursor, 1, TIMEOUT).await.unwrap_err().is_transient());
        assert!(log.get_messages(&cursor, 1, TIMEOUT).await.is_ok());
        assert_eq!(log.fetch_count(), 2);
    }
}
