//! Prometheus metrics for consumer loops
//!
//! Counters are labeled by the loop name from `ConsumerLoopConfig`.

use prometheus::{register_int_counter_vec, IntCounterVec};

lazy_static::lazy_static! {
    /// Fetch attempts by outcome (ok/unavailable/invalid_cursor/config)
    static ref CONSUMER_FETCHES: IntCounterVec = register_int_counter_vec!(
        "stream_consumer_fetches_total",
        "Batch fetch attempts by outcome",
        &["consumer", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Messages handed to the handler by outcome (ok/failed)
    static ref CONSUMER_MESSAGES: IntCounterVec = register_int_counter_vec!(
        "stream_consumer_messages_total",
        "Messages dispatched to the handler by outcome",
        &["consumer", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");

    /// Manual commit failures
    static ref CONSUMER_COMMIT_FAILURES: IntCounterVec = register_int_counter_vec!(
        "stream_consumer_commit_failures_total",
        "Failed cursor commits",
        &["consumer"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub(crate) fn record_fetch(consumer: &str, outcome: &str) {
    CONSUMER_FETCHES
        .with_label_values(&[consumer, outcome])
        .inc();
}

pub(crate) fn record_message(consumer: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    CONSUMER_MESSAGES
        .with_label_values(&[consumer, outcome])
        .inc();
}

pub(crate) fn record_commit_failure(consumer: &str) {
    CONSUMER_COMMIT_FAILURES.with_label_values(&[consumer]).inc();
}
