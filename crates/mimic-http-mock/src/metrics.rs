//! Prometheus metrics for mimic.
//!
//! Tracks lookups, scenario selection, saves and recordings.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, register_int_gauge,
    CounterVec, Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};
use std::time::Duration;

lazy_static! {
    /// Lookups by outcome
    pub static ref LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_lookups_total",
        "Total number of scenario lookups",
        &["outcome"]  // outcome: matched|no_match|validation_mismatch|storage_inconsistency|render
    )
    .unwrap();

    /// Lookup latency, excluding artificial delays
    pub static ref LOOKUP_DURATION_MS: HistogramVec = register_histogram_vec!(
        "mimic_lookup_duration_ms",
        "Histogram of lookup time in milliseconds",
        &["outcome"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0]
    )
    .unwrap();

    /// Selections per lookup bucket; scenario names are unbounded, so they
    /// stay out of the labels
    pub static ref SCENARIO_SELECTIONS: CounterVec = register_counter_vec!(
        "mimic_scenario_selections_total",
        "Number of scenario selections per method and first path segment",
        &["method", "prefix"]
    )
    .unwrap();

    /// Successful saves
    pub static ref SCENARIOS_SAVED: IntCounter = register_int_counter!(
        "mimic_scenarios_saved_total",
        "Total number of scenarios saved"
    )
    .unwrap();

    /// Scenarios currently indexed
    pub static ref INDEXED_SCENARIOS: IntGauge = register_int_gauge!(
        "mimic_indexed_scenarios",
        "Number of scenario descriptors in the key index"
    )
    .unwrap();

    /// Record-mode upstream calls
    pub static ref RECORDINGS_TOTAL: CounterVec = register_counter_vec!(
        "mimic_recordings_total",
        "Total number of upstream calls made in record mode",
        &["result"]  // result: recorded|upstream_error|save_error
    )
    .unwrap();

    /// Playback responses by status
    pub static ref PLAYBACK_RESPONSES_TOTAL: CounterVec = register_counter_vec!(
        "mimic_playback_responses_total",
        "Total number of responses served on the playback listener",
        &["method", "status"]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record a lookup outcome and its latency
pub fn record_lookup(outcome: &str, elapsed: Duration) {
    LOOKUPS_TOTAL.with_label_values(&[outcome]).inc();
    LOOKUP_DURATION_MS
        .with_label_values(&[outcome])
        .observe(elapsed.as_secs_f64() * 1000.0);
}

/// Helper to record a selection in the bucket `(method, prefix)`
pub fn record_selection(method: &str, prefix: &str) {
    SCENARIO_SELECTIONS
        .with_label_values(&[method, prefix])
        .inc();
}

/// Helper to record a record-mode upstream call
pub fn record_recording(result: &str) {
    RECORDINGS_TOTAL.with_label_values(&[result]).inc();
}

/// Helper to record a playback response
pub fn record_playback_response(method: &str, status: u16) {
    PLAYBACK_RESPONSES_TOTAL
        .with_label_values(&[method, &status.to_string()])
        .inc();
}
