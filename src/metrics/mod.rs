use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Total number of raw events received from the stream
    pub static ref EVENTS_RECEIVED_TOTAL: CounterVec = register_counter_vec!(
        "cdcstream_events_received_total",
        "Total number of raw events received",
        &["topic"]
    ).unwrap();

    /// Total number of events decoded and dispatched to the handler
    pub static ref EVENTS_DECODED_TOTAL: CounterVec = register_counter_vec!(
        "cdcstream_events_decoded_total",
        "Total number of events decoded and dispatched",
        &["topic", "change_type"]
    ).unwrap();

    /// Total number of events that failed to decode
    pub static ref DECODE_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "cdcstream_decode_failures_total",
        "Total number of events that failed to decode",
        &["topic", "error_type"]
    ).unwrap();

    /// Total number of batches received, keepalives included
    pub static ref BATCHES_TOTAL: CounterVec = register_counter_vec!(
        "cdcstream_batches_total",
        "Total number of fetch batches received",
        &["topic", "kind"]
    ).unwrap();

    /// Events requested but not yet delivered
    pub static ref OUTSTANDING_CREDIT: GaugeVec = register_gauge_vec!(
        "cdcstream_outstanding_credit",
        "Events requested from the server but not yet delivered",
        &["topic"]
    ).unwrap();

    /// Sessions by terminal state
    pub static ref SESSIONS_TOTAL: CounterVec = register_counter_vec!(
        "cdcstream_sessions_total",
        "Subscription sessions by terminal state",
        &["topic", "outcome"]
    ).unwrap();

    /// Time spent decoding a single event
    pub static ref DECODE_DURATION: HistogramVec = register_histogram_vec!(
        "cdcstream_decode_duration_seconds",
        "Time taken to decode a single event",
        &["topic"],
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]
    ).unwrap();
}

/// Record a received batch
pub fn record_batch(topic: &str, event_count: usize) {
    let kind = if event_count == 0 { "keepalive" } else { "events" };
    BATCHES_TOTAL.with_label_values(&[topic, kind]).inc();
    EVENTS_RECEIVED_TOTAL
        .with_label_values(&[topic])
        .inc_by(event_count as f64);
}

/// Record a decoded event
pub fn record_event_decoded(topic: &str, change_type: &str, duration: Duration) {
    EVENTS_DECODED_TOTAL
        .with_label_values(&[topic, change_type])
        .inc();
    DECODE_DURATION
        .with_label_values(&[topic])
        .observe(duration.as_secs_f64());
}

/// Record a decode failure
pub fn record_decode_failure(topic: &str, error_type: &str) {
    DECODE_FAILURES_TOTAL
        .with_label_values(&[topic, error_type])
        .inc();
}

/// Update outstanding credit
pub fn update_outstanding_credit(topic: &str, credit: u32) {
    OUTSTANDING_CREDIT
        .with_label_values(&[topic])
        .set(credit as f64);
}

/// Record a session reaching a terminal state
pub fn record_session_outcome(topic: &str, outcome: &str) {
    SESSIONS_TOTAL.with_label_values(&[topic, outcome]).inc();
}

/// Export metrics in Prometheus format
pub fn export_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
