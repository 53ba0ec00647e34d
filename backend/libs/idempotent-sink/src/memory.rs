//! In-process sink for tests and local runs

use crate::error::{SinkError, SinkResult};
use crate::{validate_name, Person, Sink, StoredPerson};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// HashMap-backed [`Sink`] with the same merge semantics as `PgSink`
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: RwLock<HashMap<String, StoredPerson>>,
    unavailable: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a persistence error until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of all rows, sorted by name
    pub async fn snapshot(&self) -> Vec<StoredPerson> {
        let mut rows: Vec<_> = self.rows.read().await.values().cloned().collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }

    fn check_available(&self) -> SinkResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SinkError::Persistence(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn upsert(&self, entry: &Person) -> SinkResult<()> {
        entry.validate()?;
        self.check_available()?;

        let mut rows = self.rows.write().await;
        rows.entry(entry.name.clone())
            .and_modify(|row| {
                row.age = entry.age;
                row.comment = entry.comment.clone();
            })
            .or_insert_with(|| StoredPerson {
                name: entry.name.clone(),
                age: entry.age,
                comment: entry.comment.clone(),
                creation_time: Utc::now(),
            });

        Ok(())
    }

    async fn delete(&self, name: &str) -> SinkResult<bool> {
        validate_name(name)?;
        self.check_available()?;

        Ok(self.rows.write().await.remove(name).is_some())
    }

    async fn get(&self, name: &str) -> SinkResult<Option<StoredPerson>> {
        validate_name(name)?;
        self.check_available()?;

        Ok(self.rows.read().await.get(name).cloned())
    }

    async fn count(&self) -> SinkResult<i64> {
        self.check_available()?;
        Ok(self.rows.read().await.len() as i64)
    }

    async fn ensure_schema(&self) -> SinkResult<()> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let sink = MemorySink::new();

        sink.upsert(&Person::new("X", 10, "first")).await.unwrap();
        let created = sink.get("X").await.unwrap().unwrap().creation_time;

        sink.upsert(&Person::new("X", 11, "second")).await.unwrap();

        let stored = sink.get("X").await.unwrap().unwrap();
        assert_eq!(stored.age, 11);
        assert_eq!(stored.comment, "second");
        assert_eq!(stored.creation_time, created);
        assert_eq!(sink.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let sink = MemorySink::new();
        sink.upsert(&Person::new("Betty", 30, "")).await.unwrap();

        assert!(sink.delete("Betty").await.unwrap());
        assert!(!sink.delete("Betty").await.unwrap());
        assert!(sink.get("Betty").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_entry_writes_nothing() {
        let sink = MemorySink::new();

        let err = sink.upsert(&Person::new("", 1, "")).await.unwrap_err();
        assert!(matches!(err, SinkError::InvalidEntry(_)));
        assert_eq!(sink.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_store_keeps_state() {
        let sink = MemorySink::new();
        sink.upsert(&Person::new("Doris", 50, "")).await.unwrap();

        sink.set_unavailable(true);
        let err = sink.upsert(&Person::new("Doris", 51, "")).await.unwrap_err();
        assert!(err.is_transient());

        sink.set_unavailable(false);
        assert_eq!(sink.get("Doris").await.unwrap().unwrap().age, 50);
    }
}
