//! Stream → sink pipeline over the in-memory log

use idempotent_sink::{MemorySink, Sink};
use people_service::PersonMessageHandler;
use std::sync::Arc;
use std::time::Duration;
use stream_consumer::{ConsumerLoop, ConsumerLoopConfig, CursorMode, InMemoryLog, StopReason};
use tokio::sync::watch;

fn quick_config(max_iterations: u32) -> ConsumerLoopConfig {
    ConsumerLoopConfig {
        max_iterations,
        inter_batch_delay: Duration::ZERO,
        retry_backoff: Duration::ZERO,
        max_retry_backoff: Duration::ZERO,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_stream_updates_existing_row() {
    let log = Arc::new(InMemoryLog::single_partition());
    let sink = Arc::new(MemorySink::new());
    let handler = PersonMessageHandler::new(sink.clone());
    let (_tx, rx) = watch::channel(false);

    let consumer = ConsumerLoop::new(log.clone(), quick_config(1), rx.clone());
    let cursor = consumer.initialize_cursor(&CursorMode::Earliest).await.unwrap();
    let report = consumer.run(cursor, &handler).await;
    assert_eq!(report.messages_dispatched, 0);
    assert_eq!(sink.count().await.unwrap(), 0);

    log.append("0", "A", r#"{"name":"X","age":10}"#).await;
    let report = consumer.run(report.final_cursor, &handler).await;
    assert_eq!(report.messages_dispatched, 1);
    assert_eq!(sink.get("X").await.unwrap().unwrap().age, 10);

    log.append("0", "A", r#"{"name":"X","age":11}"#).await;
    let report = consumer.run(report.final_cursor, &handler).await;
    assert_eq!(report.stop_reason, StopReason::Completed);
    assert_eq!(sink.get("X").await.unwrap().unwrap().age, 11);
    assert_eq!(sink.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_malformed_and_rejected_messages_are_isolated() {
    let log = Arc::new(InMemoryLog::single_partition());
    log.append("0", "1", r#"{"name":"Hans","age":40}"#).await;
    log.append("0", "2", "{broken").await;
    log.append("0", "3", r#"{"name":"","age":40}"#).await;
    log.append("0", "4", r#"{"name":"Betty","age":29}"#).await;

    let sink = Arc::new(MemorySink::new());
    let handler = PersonMessageHandler::new(sink.clone());
    let (_tx, rx) = watch::channel(false);

    let report = ConsumerLoop::new(log, quick_config(2), rx)
        .run_from(&CursorMode::Earliest, &handler)
        .await
        .unwrap();

    assert_eq!(report.messages_dispatched, 4);
    assert_eq!(report.handler_failures, 2);
    let names: Vec<_> = sink.snapshot().await.into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Betty", "Hans"]);
}

#[tokio::test]
async fn test_unavailable_sink_does_not_stop_loop() {
    let log = Arc::new(InMemoryLog::single_partition());
    log.append("0", "1", r#"{"name":"Hans","age":40}"#).await;

    let sink = Arc::new(MemorySink::new());
    sink.set_unavailable(true);
    let handler = PersonMessageHandler::new(sink.clone());
    let (_tx, rx) = watch::channel(false);

    let report = ConsumerLoop::new(log, quick_config(3), rx)
        .run_from(&CursorMode::Earliest, &handler)
        .await
        .unwrap();

    assert_eq!(report.fetch_attempts, 3);
    assert_eq!(report.handler_failures, 1);
    assert_eq!(report.stop_reason, StopReason::Completed);
}
