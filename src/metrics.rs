//! Prometheus metrics for the sync executor and audit log

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

lazy_static! {
    /// Histogram: ATS push duration per entity type (seconds)
    pub static ref PUSH_DURATION: HistogramVec = register_histogram_vec!(
        "ats_sync_push_duration_seconds",
        "Duration of ATS push operations",
        &["entity_type"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0]
    )
    .expect("Failed to create push_duration metric");

    /// Counter: push attempts by outcome (success, transient, permanent)
    pub static ref PUSH_ATTEMPTS: CounterVec = register_counter_vec!(
        "ats_sync_push_attempts_total",
        "ATS push attempts by outcome",
        &["entity_type", "outcome"]
    )
    .expect("Failed to create push_attempts metric");

    /// Counter: events dropped because sync is not in effect
    pub static ref EVENTS_SKIPPED: CounterVec = register_counter_vec!(
        "ats_sync_events_skipped_total",
        "Events skipped because sync is disabled for the target",
        &["scope"]
    )
    .expect("Failed to create events_skipped metric");

    /// Counter: retries scheduled after transient failures
    pub static ref RETRIES_SCHEDULED: CounterVec = register_counter_vec!(
        "ats_sync_retries_scheduled_total",
        "Retries scheduled after transient push failures",
        &["scope"]
    )
    .expect("Failed to create retries_scheduled metric");

    /// Counter: audit log entries that could not be written
    pub static ref LOG_APPEND_FAILURES: CounterVec = register_counter_vec!(
        "ats_sync_log_append_failures_total",
        "Sync log entries lost to storage errors",
        &["store"]
    )
    .expect("Failed to create log_append_failures metric");

    /// Gauge: pushes currently in flight
    pub static ref PUSHES_IN_FLIGHT: Gauge = register_gauge!(
        "ats_sync_pushes_in_flight",
        "Number of ATS pushes currently in flight"
    )
    .expect("Failed to create pushes_in_flight metric");

    /// Gauge: executor health status (1 = running, 0 = stopped)
    pub static ref HEALTH_STATUS: Gauge = register_gauge!(
        "ats_sync_health_status",
        "Executor health status (1 = running, 0 = stopped)"
    )
    .expect("Failed to create health_status metric");
}

pub fn record_push_duration(entity_type: &str, duration_secs: f64) {
    PUSH_DURATION
        .with_label_values(&[entity_type])
        .observe(duration_secs);
}

pub fn record_push_attempt(entity_type: &str, outcome: &str) {
    PUSH_ATTEMPTS
        .with_label_values(&[entity_type, outcome])
        .inc();
}

pub fn record_skipped(scope: &str) {
    EVENTS_SKIPPED.with_label_values(&[scope]).inc();
}

pub fn record_retry_scheduled(scope: &str) {
    RETRIES_SCHEDULED.with_label_values(&[scope]).inc();
}

pub fn record_log_append_failure() {
    LOG_APPEND_FAILURES.with_label_values(&["sqlite"]).inc();
}

pub fn push_started() {
    PUSHES_IN_FLIGHT.inc();
}

pub fn push_finished() {
    PUSHES_IN_FLIGHT.dec();
}

pub fn set_health_status(healthy: bool) {
    HEALTH_STATUS.set(if healthy { 1.0 } else { 0.0 });
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::AtsSyncError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::AtsSyncError::Other(format!("Metrics are not UTF-8: {}", e)))
}
