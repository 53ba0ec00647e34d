//! Kafka partition source
//!
//! Reads a single topic partition through an rdkafka `BaseConsumer` that is
//! explicitly assigned to the cursor's offset on every fetch. Cursor tokens
//! look like `people/0@42` (topic, partition, next offset to read).
//!
//! Auto-commit is disabled: pair the source with itself as the
//! [`CursorCommitter`] to store the consumed offset for the consumer group, or
//! with [`CommitOnRead`](super::CommitOnRead) to keep positions client-side.

use super::{CursorCommitter, MessageSource};
use crate::cursor::{Batch, Cursor, CursorMode, Message as LogMessage};
use crate::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Kafka source configuration
#[derive(Debug, Clone)]
pub struct KafkaSourceConfig {
    pub brokers: String,
    pub group_id: String,
    pub topic: String,
    pub partition: i32,
    /// Bound for watermark / offset lookups
    pub metadata_timeout: Duration,
}

impl Default for KafkaSourceConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "person-message-1".to_string(),
            topic: "people".to_string(),
            partition: 0,
            metadata_timeout: Duration::from_secs(5),
        }
    }
}

/// Cursor-addressed reader for one Kafka topic partition
pub struct KafkaPartitionSource {
    consumer: Arc<BaseConsumer>,
    config: KafkaSourceConfig,
}

impl KafkaPartitionSource {
    /// Create the underlying consumer (no broker round-trip happens here)
    pub fn new(config: KafkaSourceConfig) -> ConsumerResult<Self> {
        let consumer: BaseConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false") // positions move only through cursors
            .set("enable.auto.offset.store", "false")
            .set("enable.partition.eof", "true")
            .set("auto.offset.reset", "error")
            .set("session.timeout.ms", "45000")
            .create()?;

        info!(
            brokers = %config.brokers,
            topic = %config.topic,
            partition = config.partition,
            group_id = %config.group_id,
            "Kafka partition source initialized"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
            config,
        })
    }

    pub fn config(&self) -> &KafkaSourceConfig {
        &self.config
    }

    fn token(&self, offset: i64) -> Cursor {
        format_token(&self.config.topic, self.config.partition, offset)
    }

    fn parse(&self, cursor: &Cursor) -> ConsumerResult<i64> {
        parse_token(cursor, &self.config.topic, self.config.partition)
    }

    /// Run a librdkafka call on the blocking pool
    async fn blocking<F, T>(&self, f: F) -> ConsumerResult<T>
    where
        F: FnOnce(&BaseConsumer, &KafkaSourceConfig) -> ConsumerResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let consumer = Arc::clone(&self.consumer);
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || f(&consumer, &config))
            .await
            .map_err(|e| ConsumerError::SourceUnavailable(format!("Kafka worker failed: {}", e)))?
    }
}

fn format_token(topic: &str, partition: i32, offset: i64) -> Cursor {
    Cursor::new(format!("{}/{}@{}", topic, partition, offset))
}

fn parse_token(cursor: &Cursor, topic: &str, partition: i32) -> ConsumerResult<i64> {
    let invalid = || ConsumerError::InvalidCursor(format!("malformed Kafka cursor '{}'", cursor));

    let (position, offset) = cursor.as_str().rsplit_once('@').ok_or_else(invalid)?;
    let (cursor_topic, cursor_partition) = position.rsplit_once('/').ok_or_else(invalid)?;
    let cursor_partition: i32 = cursor_partition.parse().map_err(|_| invalid())?;
    let offset: i64 = offset.parse().map_err(|_| invalid())?;

    if cursor_topic != topic || cursor_partition != partition {
        return Err(ConsumerError::InvalidCursor(format!(
            "cursor '{}' does not belong to {}/{}",
            cursor, topic, partition
        )));
    }

    if offset < 0 {
        return Err(invalid());
    }

    Ok(offset)
}

fn check_retained(offset: i64, low: i64, high: i64) -> ConsumerResult<()> {
    if offset < low || offset > high {
        return Err(ConsumerError::InvalidCursor(format!(
            "offset {} outside retained range [{}, {}]",
            offset, low, high
        )));
    }
    Ok(())
}

#[async_trait]
impl MessageSource for KafkaPartitionSource {
    async fn create_cursor(&self, mode: &CursorMode) -> ConsumerResult<Cursor> {
        let mode = mode.clone();

        let offset = self
            .blocking(move |consumer, config| {
                let (low, high) = consumer.fetch_watermarks(
                    &config.topic,
                    config.partition,
                    config.metadata_timeout,
                )?;

                match mode {
                    CursorMode::Earliest => Ok(low),
                    CursorMode::Latest => Ok(high),
                    CursorMode::AfterOffset { partition, offset } => {
                        if partition.parse::<i32>().ok() != Some(config.partition) {
                            return Err(ConsumerError::InvalidCursor(format!(
                                "partition '{}' is not served by this source",
                                partition
                            )));
                        }
                        let next = offset + 1;
                        check_retained(next, low, high)?;
                        Ok(next)
                    }
                    CursorMode::AtTime { time } => {
                        let mut tpl = TopicPartitionList::new();
                        tpl.add_partition_offset(
                            &config.topic,
                            config.partition,
                            Offset::Offset(time.timestamp_millis()),
                        )?;
                        let resolved = consumer.offsets_for_times(tpl, config.metadata_timeout)?;
                        let offset = resolved
                            .find_partition(&config.topic, config.partition)
                            .and_then(|elem| match elem.offset() {
                                Offset::Offset(o) => Some(o),
                                _ => None,
                            })
                            .unwrap_or(high);
                        Ok(offset)
                    }
                }
            })
            .await?;

        debug!(offset, "Created Kafka cursor");
        Ok(self.token(offset))
    }

    async fn get_messages(
        &self,
        cursor: &Cursor,
        limit: usize,
        timeout: Duration,
    ) -> ConsumerResult<Batch> {
        let start = self.parse(cursor)?;

        let (messages, next) = self
            .blocking(move |consumer, config| {
                let (low, high) = consumer.fetch_watermarks(
                    &config.topic,
                    config.partition,
                    config.metadata_timeout,
                )?;
                check_retained(start, low, high)?;

                let mut tpl = TopicPartitionList::new();
                tpl.add_partition_offset(&config.topic, config.partition, Offset::Offset(start))?;
                consumer.assign(&tpl)?;

                let deadline = Instant::now() + timeout;
                let mut messages = Vec::new();
                let mut next = start;

                while messages.len() < limit {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }

                    match consumer.poll(remaining) {
                        None => break,
                        Some(Ok(msg)) => {
                            if msg.topic() != config.topic || msg.partition() != config.partition {
                                continue;
                            }
                            messages.push(LogMessage::new(
                                msg.key().map(<[u8]>::to_vec).unwrap_or_default(),
                                msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                                msg.partition().to_string(),
                                msg.offset(),
                            ));
                            next = msg.offset() + 1;
                        }
                        Some(Err(KafkaError::PartitionEOF(_))) => break,
                        Some(Err(e)) => return Err(e.into()),
                    }
                }

                Ok((messages, next))
            })
            .await?;

        Ok(Batch {
            messages,
            next_cursor: self.token(next),
        })
    }

    /// Cursor at the offset last committed by this consumer group, if any
    async fn committed_cursor(&self) -> ConsumerResult<Option<Cursor>> {
        let offset = self
            .blocking(|consumer, config| {
                let mut tpl = TopicPartitionList::new();
                tpl.add_partition(&config.topic, config.partition);
                let committed = consumer.committed_offsets(tpl, config.metadata_timeout)?;
                Ok(committed
                    .find_partition(&config.topic, config.partition)
                    .and_then(|elem| match elem.offset() {
                        Offset::Offset(o) => Some(o),
                        _ => None,
                    }))
            })
            .await?;

        Ok(offset.map(|o| self.token(o)))
    }
}

#[async_trait]
impl CursorCommitter for KafkaPartitionSource {
    async fn commit(&self, next_cursor: &Cursor) -> ConsumerResult<()> {
        let offset = self.parse(next_cursor)?;

        self.blocking(move |consumer, config| {
            let mut tpl = TopicPartitionList::new();
            tpl.add_partition_offset(&config.topic, config.partition, Offset::Offset(offset))?;
            consumer
                .commit(&tpl, CommitMode::Sync)
                .map_err(|e| ConsumerError::Commit(e.to_string()))
        })
        .await?;

        debug!(offset, "Committed Kafka offset");
        Ok(())
    }
}
