//! Metrics module
//!
//! Prometheus metrics for presigning, transfers, server-side uploads and
//! listings. Served in text format on `/metrics` by the HTTP server.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Presign metrics
    pub static ref PRESIGN_TOTAL: CounterVec = register_counter_vec!(
        "kura_presign_requests_total",
        "Presign requests by outcome",
        &["status"]  // "issued", "rejected" or "failed"
    ).unwrap();

    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "kura_uploads_total",
        "Total number of uploads",
        &["method", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "kura_upload_bytes_total",
        "Total bytes uploaded"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "kura_upload_duration_seconds",
        "Upload duration in seconds",
        &["method"],  // "direct" or "server"
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // Listing metrics
    pub static ref LISTINGS_TOTAL: CounterVec = register_counter_vec!(
        "kura_listings_total",
        "Listing requests by kind",
        &["kind"]  // "page" or "count"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "kura_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a presign outcome
pub fn record_presign(status: &str) {
    PRESIGN_TOTAL.with_label_values(&[status]).inc();
}

/// Record a successful upload
pub fn record_upload_success(method: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[method, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(method: &str) {
    UPLOADS_TOTAL.with_label_values(&[method, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(method: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[method])
        .observe(duration_secs);
}

pub fn record_listing(kind: &str) {
    LISTINGS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Gather all registered metrics in Prometheus text format
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
