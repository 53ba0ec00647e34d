//! # Stream Consumer Library
//!
//! Cursor-driven consumption of an ordered, partitioned log. A
//! [`ConsumerLoop`] repeatedly fetches a bounded batch from a
//! [`MessageSource`], dispatches each message to a [`MessageHandler`] in log
//! order, commits the position and advances the cursor.
//!
//! ## Guarantees
//!
//! - **At-least-once**: the cursor only moves after the batch was dispatched
//!   and committed; anything else is redelivered from the old cursor
//! - **Ordering**: messages of one batch reach the handler in received order
//! - **Isolation**: a failing message does not stop the rest of the batch
//! - **Bounded**: a run makes at most `max_iterations` fetch attempts and
//!   honors the shutdown flag between steps
//!
//! ## Architecture
//!
//! ```text
//! MessageSource ──fetch──► ConsumerLoop ──on_message──► MessageHandler ──► Sink
//!      ▲                        │
//!      └──────── commit ◄───────┘ (CursorCommitter)
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stream_consumer::{ConsumerLoop, ConsumerLoopConfig, CursorMode, InMemoryLog};
//! use tokio::sync::watch;
//!
//! # async fn example(handler: impl stream_consumer::MessageHandler) -> Result<(), Box<dyn std::error::Error>> {
//! let log = Arc::new(InMemoryLog::single_partition());
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let consumer = ConsumerLoop::new(log, ConsumerLoopConfig::default(), shutdown_rx);
//! let report = consumer.run_from(&CursorMode::Latest, &handler).await?;
//! println!("stopped at {} ({:?})", report.final_cursor, report.stop_reason);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sources
//!
//! - [`InMemoryLog`]: local multi-partition log for tests and demos
//! - [`KafkaPartitionSource`]: one Kafka topic partition via rdkafka
//! - [`HttpStreamSource`]: managed streaming REST endpoint via reqwest

pub mod clock;
pub mod consumer;
pub mod cursor;
pub mod error;
mod metrics;
pub mod source;

pub use clock::{Clock, TokioClock};
pub use consumer::{
    ConsumerLoop, ConsumerLoopConfig, InvalidCursorPolicy, LoopReport, MessageHandler, StopReason,
};
pub use cursor::{Batch, Cursor, CursorMode, Message};
pub use error::{ConsumerError, ConsumerResult};
pub use source::{
    CommitOnRead, CursorCommitter, HttpStreamSource, HttpStreamSourceConfig, InMemoryLog,
    KafkaPartitionSource, KafkaSourceConfig, MessageSource, StreamConnectDetails,
};
