//! Glue between the sources (stream, object file) and the sink

use crate::metrics::record_write;
use async_trait::async_trait;
use idempotent_sink::{Person, Sink, SinkError};
use serde::Serialize;
use std::sync::Arc;
use stream_consumer::{Message, MessageHandler};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Malformed person message: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Decodes each stream message as a `Person` and upserts it
pub struct PersonMessageHandler {
    sink: Arc<dyn Sink>,
}

impl PersonMessageHandler {
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl MessageHandler for PersonMessageHandler {
    type Error = HandlerError;

    async fn on_message(&self, message: &Message) -> Result<(), Self::Error> {
        let person: Person = message.decode()?;

        let result = self.sink.upsert(&person).await;
        record_write("stream", "upsert", result.is_ok());
        result?;

        info!(
            key = %message.key_str(),
            partition = %message.partition,
            offset = message.offset,
            name = %person.name,
            age = person.age,
            "Persisted person from stream"
        );
        Ok(())
    }
}

/// Outcome of loading one people file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub persisted: usize,
    pub failed: usize,
}

/// Parse a JSON array of people and upsert each one
///
/// A document that is not a JSON array of people fails as a whole; a record
/// the sink rejects is counted and skipped.
pub async fn ingest_people_json(
    sink: &dyn Sink,
    document: &[u8],
) -> Result<IngestReport, serde_json::Error> {
    let people: Vec<Person> = serde_json::from_slice(document)?;
    let mut report = IngestReport::default();

    for person in &people {
        match sink.upsert(person).await {
            Ok(()) => {
                record_write("file", "upsert", true);
                report.persisted += 1;
            }
            Err(e) => {
                record_write("file", "upsert", false);
                warn!(name = %person.name, error = %e, "Failed to persist person from file");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use idempotent_sink::MemorySink;

    #[tokio::test]
    async fn test_handler_upserts_decoded_person() {
        let sink = Arc::new(MemorySink::new());
        let handler = PersonMessageHandler::new(sink.clone());

        let message = Message::new("A", r#"{"name":"X","age":10}"#, "0", 0);
        handler.on_message(&message).await.unwrap();

        let message = Message::new("A", r#"{"name":"X","age":11}"#, "0", 1);
        handler.on_message(&message).await.unwrap();

        assert_eq!(sink.count().await.unwrap(), 1);
        assert_eq!(sink.get("X").await.unwrap().unwrap().age, 11);
    }

    #[tokio::test]
    async fn test_handler_reports_malformed_message() {
        let sink = Arc::new(MemorySink::new());
        let handler = PersonMessageHandler::new(sink.clone());

        let message = Message::new("A", "not json", "0", 0);
        let err = handler.on_message(&message).await.unwrap_err();

        assert!(matches!(err, HandlerError::Deserialization(_)));
        assert_eq!(sink.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_handler_surfaces_sink_failure() {
        let sink = Arc::new(MemorySink::new());
        sink.set_unavailable(true);
        let handler = PersonMessageHandler::new(sink.clone());

        let message = Message::new("A", r#"{"name":"X","age":10}"#, "0", 0);
        let err = handler.on_message(&message).await.unwrap_err();

        assert!(matches!(err, HandlerError::Sink(_)));
    }

    #[tokio::test]
    async fn test_ingest_counts_rejected_records() {
        let sink = MemorySink::new();
        let document = br#"[
            {"name": "Hans", "age": 40, "comment": "first"},
            {"name": "", "age": 1},
            {"name": "Janet", "age": 33}
        ]"#;

        let report = ingest_people_json(&sink, document).await.unwrap();

        assert_eq!(report, IngestReport { persisted: 2, failed: 1 });
        assert_eq!(sink.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_array() {
        let sink = MemorySink::new();
        assert!(ingest_people_json(&sink, br#"{"name":"Hans"}"#).await.is_err());
    }
}
