//! Prometheus metrics collection
//!
//! Metrics are registered with the default registry and served by the probe
//! server on `/metrics`.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};

/// Reconciliation passes by result
pub static RECONCILE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "flyte_registration_reconcile_total",
        "Total number of reconciliation passes",
        &["result"]
    )
    .expect("Failed to create reconcile counter")
});

/// Reconciliation pass duration
pub static RECONCILE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "flyte_registration_reconcile_duration_seconds",
        "Reconciliation pass duration in seconds",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to create reconcile duration histogram")
});

/// Artifact downloads by strategy and status
pub static ARTIFACT_DOWNLOADS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "flyte_registration_artifact_downloads_total",
        "Total number of artifact downloads",
        &["strategy", "status"]
    )
    .expect("Failed to create artifact downloads counter")
});

/// Initialize metrics
pub fn init_metrics() {
    Lazy::force(&RECONCILE_TOTAL);
    Lazy::force(&RECONCILE_DURATION);
    Lazy::force(&ARTIFACT_DOWNLOADS_TOTAL);

    tracing::debug!("Metrics initialized");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to string: {}", e))
}

/// Record a finished reconciliation pass
pub fn record_reconcile(result: &str, duration_secs: f64) {
    RECONCILE_TOTAL.with_label_values(&[result]).inc();
    RECONCILE_DURATION.observe(duration_secs);
}

/// Record an artifact download
pub fn record_download(strategy: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    ARTIFACT_DOWNLOADS_TOTAL
        .with_label_values(&[strategy, status])
        .inc();
}
