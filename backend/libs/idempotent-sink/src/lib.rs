//! # Idempotent Sink Library
//!
//! Durable, merge-style persistence for `Person` records keyed by name.
//! Writing the same record twice leaves exactly one row holding the latest
//! values, so at-least-once delivery from a stream never creates duplicates.
//!
//! ## Architecture
//!
//! ```text
//! ConsumerLoop / HTTP handler → Sink::upsert → INSERT … ON CONFLICT (name) DO UPDATE
//!                                                   ↓
//!                                              PostgreSQL
//!                                            (people table)
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use idempotent_sink::{PgSink, Person, Sink};
//! use sqlx::PgPool;
//!
//! # async fn example(pool: PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! let sink = PgSink::new(pool);
//! sink.ensure_schema().await?;
//!
//! sink.upsert(&Person::new("X", 10, "first")).await?;
//! sink.upsert(&Person::new("X", 11, "second")).await?;
//!
//! let stored = sink.get("X").await?.expect("row exists");
//! assert_eq!(stored.age, 11);
//! assert_eq!(sink.count().await?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Every upsert runs in its own transaction and holds no locks between
//! calls. Two writers racing on the same name both succeed; the last commit
//! wins.
//!
//! ## Database Migration
//!
//! [`Sink::ensure_schema`] creates the table on startup. To manage it with
//! sqlx instead:
//!
//! ```bash
//! sqlx migrate run --source backend/libs/idempotent-sink/migrations
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod error;
mod memory;
mod postgres;

pub use error::{SinkError, SinkResult};
pub use memory::MemorySink;
pub use postgres::PgSink;

/// Maximum characters in a person's name (primary key column width)
pub const MAX_NAME_LEN: usize = 100;

/// Maximum characters in the free-text comment
pub const MAX_COMMENT_LEN: usize = 1000;

/// Record carried by stream messages and HTTP bodies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i32,
    #[serde(default)]
    pub comment: String,
}

impl Person {
    pub fn new(name: impl Into<String>, age: i32, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age,
            comment: comment.into(),
        }
    }

    /// Reject entries the store could not hold
    pub fn validate(&self) -> SinkResult<()> {
        validate_name(&self.name)?;

        let comment_len = self.comment.chars().count();
        if comment_len > MAX_COMMENT_LEN {
            return Err(SinkError::InvalidEntry(format!(
                "Comment too long: {} characters (max {})",
                comment_len, MAX_COMMENT_LEN
            )));
        }

        Ok(())
    }
}

/// A person as read back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPerson {
    pub name: String,
    pub age: i32,
    pub comment: String,
    /// When the row was first inserted; updates keep it
    pub creation_time: DateTime<Utc>,
}

impl From<StoredPerson> for Person {
    fn from(stored: StoredPerson) -> Self {
        Person {
            name: stored.name,
            age: stored.age,
            comment: stored.comment,
        }
    }
}

/// Validate a name used as the sink key
pub fn validate_name(name: &str) -> SinkResult<()> {
    if name.is_empty() {
        return Err(SinkError::InvalidEntry(
            "Name cannot be empty".to_string(),
        ));
    }

    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(SinkError::InvalidEntry(format!(
            "Name too long: {} characters (max {})",
            len, MAX_NAME_LEN
        )));
    }

    Ok(())
}

/// Keyed, merge-on-write store for people
///
/// Implementations must make `upsert` and `delete` atomic: a failed call
/// leaves the previous state untouched.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Insert the person, or overwrite age and comment when the name exists
    async fn upsert(&self, entry: &Person) -> SinkResult<()>;

    /// Remove the person; `Ok(false)` when no row had that name
    async fn delete(&self, name: &str) -> SinkResult<bool>;

    async fn get(&self, name: &str) -> SinkResult<Option<StoredPerson>>;

    /// Number of stored people
    async fn count(&self) -> SinkResult<i64>;

    /// Create the backing table if it does not exist yet
    async fn ensure_schema(&self) -> SinkResult<()>;
}
