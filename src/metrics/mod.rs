//! Metrics module
//!
//! Prometheus counters and histograms for the gateway, registered in the
//! default registry and exposed by [`server::MetricsServer`].

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, register_histogram_vec, Counter,
    CounterVec, Histogram, HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "gateway_uploads_total",
        "Total number of upload requests",
        &["mode", "status"]  // mode: "presigned" or "multipart"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "gateway_upload_bytes_total",
        "Total bytes streamed to storage"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "gateway_upload_duration_seconds",
        "Upload request duration in seconds",
        &["mode"],
        vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]
    ).unwrap();

    // Presign metrics
    pub static ref PRESIGNED_URLS_TOTAL: Counter = register_counter!(
        "gateway_presigned_urls_total",
        "Presigned upload URLs issued"
    ).unwrap();

    // Multipart metrics
    pub static ref MULTIPART_PARTS: Histogram = register_histogram!(
        "gateway_multipart_parts",
        "Number of parts per multipart upload",
        vec![1.0, 2.0, 5.0, 10.0, 50.0, 100.0, 500.0, 1000.0]
    ).unwrap();

    pub static ref MULTIPART_ABORTS: CounterVec = register_counter_vec!(
        "gateway_multipart_aborts_total",
        "Multipart sessions aborted",
        &["status"]  // whether the abort request itself succeeded
    ).unwrap();

    // Notification metrics
    pub static ref PREVIEW_NOTIFICATIONS: CounterVec = register_counter_vec!(
        "gateway_preview_notifications_total",
        "Preview notification attempts",
        &["outcome"]  // "sent", "skipped" or "failed"
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "gateway_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(mode: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[mode, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(mode: &str) {
    UPLOADS_TOTAL.with_label_values(&[mode, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(mode: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[mode])
        .observe(duration_secs);
}

/// Record an issued presigned URL
pub fn record_presigned_url() {
    PRESIGNED_URLS_TOTAL.inc();
}

/// Record the part count of a completed multipart upload
pub fn record_multipart_parts(parts_count: usize) {
    MULTIPART_PARTS.observe(parts_count as f64);
}

/// Record an abort of a multipart session
pub fn record_multipart_abort(success: bool) {
    let status = if success { "success" } else { "failure" };
    MULTIPART_ABORTS.with_label_values(&[status]).inc();
}

/// Record a preview notification outcome
pub fn record_preview_notification(outcome: &str) {
    PREVIEW_NOTIFICATIONS.with_label_values(&[outcome]).inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
