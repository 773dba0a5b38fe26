//! Prometheus metrics helpers for the event feed ingester.
//!
//! Installs the Prometheus recorder, describes every metric the ingester
//! emits, and serves the `/metrics` endpoint.
//!
//! # Usage
//!
//! ```rust,ignore
//! use eventfeed_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9092, handle).await.unwrap();
//!
//!     metrics::counter!("feed_records_inserted_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: `feed_`
//! - Suffix: unit or type (`_total`, `_bytes_total`, `_seconds`)
//! - Labels: only low-cardinality ones (`outcome`, `kind`, `reason`)
//!
//! Recording a metric before a recorder is installed is a no-op, so library
//! code records unconditionally.

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup, before any metrics are recorded.
///
/// # Panics
///
/// Panics if a recorder is already installed.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_feed_metrics();

    handle
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().ok()?;
    register_feed_metrics();
    Some(handle)
}

/// Start the Prometheus metrics HTTP server on `port`.
///
/// Binds before returning so a taken port is reported to the caller; the
/// server itself runs on a background task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

/// Register descriptions for every metric the ingester emits.
///
/// Called automatically by [`init_metrics`].
fn register_feed_metrics() {
    // =========================================================================
    // Pipeline runs
    // =========================================================================

    describe_counter!(
        "feed_runs_total",
        "Pipeline runs by terminal outcome (label: outcome=committed|failed)"
    );
    describe_histogram!(
        "feed_run_duration_seconds",
        "Wall time of one pipeline run, fetch excluded"
    );
    describe_counter!(
        "feed_run_retries_total",
        "Whole-run retries scheduled after a failed fetch or pipeline run"
    );
    describe_gauge!(
        "feed_job_running",
        "Whether the periodic ingestion job is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Extraction
    // =========================================================================

    describe_counter!(
        "feed_events_extracted_total",
        "Event elements normalized into candidate records"
    );
    describe_counter!(
        "feed_events_skipped_total",
        "Event elements skipped for bad data (label: reason)"
    );

    // =========================================================================
    // Reconciliation and batching
    // =========================================================================

    describe_counter!(
        "feed_records_inserted_total",
        "Records inserted into the catalog"
    );
    describe_counter!(
        "feed_records_updated_total",
        "Records updated in the catalog"
    );
    describe_counter!(
        "feed_records_unchanged_total",
        "Candidates identical to the stored record"
    );
    describe_counter!(
        "feed_batches_flushed_total",
        "Committed batch flushes (label: kind=insert|update)"
    );

    // =========================================================================
    // Fetch
    // =========================================================================

    describe_counter!("feed_fetch_bytes_total", "Feed payload bytes downloaded");
    describe_counter!(
        "feed_fetch_errors_total",
        "Feed downloads that failed or returned a non-success status"
    );
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Increment a counter carrying a single label.
#[inline]
pub fn increment_labeled(name: &'static str, key: &'static str, value: &'static str, count: u64) {
    metrics::counter!(name, key => value).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

/// Record a duration in seconds on a histogram.
#[inline]
pub fn record_seconds(name: &'static str, seconds: f64) {
    metrics::histogram!(name).record(seconds);
}
