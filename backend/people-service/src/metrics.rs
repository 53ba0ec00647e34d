//! Prometheus metrics for people-service

use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

lazy_static::lazy_static! {
    /// Person writes by origin (http/file/stream) and outcome
    static ref PEOPLE_WRITES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "people_service_writes_total",
        "Person upserts and deletes by origin and outcome",
        &["origin", "operation", "outcome"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

pub fn record_write(origin: &str, operation: &str, ok: bool) {
    let outcome = if ok { "success" } else { "failure" };
    PEOPLE_WRITES_TOTAL
        .with_label_values(&[origin, operation, outcome])
        .inc();
}

/// Render the default registry in the text exposition format
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
