//! Prometheus Metrics Definitions
//!
//! Defines all LeanCRM metrics with appropriate labels and types.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use leancrm_core::IdentityMode;
use leancrm_storage::SweepReport;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
/// Covers: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 2.5s, 5s, 10s
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<LeanCrmMetrics>> = Lazy::new(LeanCrmMetrics::new);

/// Container for all LeanCRM metrics.
#[derive(Clone)]
pub struct LeanCrmMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Demo stores created - labels: mode
    pub demo_stores_provisioned_total: CounterVec,

    /// Failed provisioning attempts - labels: mode
    pub demo_provision_failures_total: CounterVec,

    /// Stores destroyed at access time - labels: mode
    pub demo_sessions_expired_total: CounterVec,

    /// Reaper runs - labels: status (clean/partial)
    pub demo_purge_sweeps_total: CounterVec,

    /// Reaper deletions - labels: kind (store/upload_dir/temp_artifact/token)
    pub demo_purge_deletions_total: CounterVec,
}

fn register_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

impl LeanCrmMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "leancrm_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| register_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "leancrm_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| register_error("http_request_duration_seconds", e))?,

            demo_stores_provisioned_total: register_counter_vec!(
                "leancrm_demo_stores_provisioned_total",
                "Total number of demo stores created",
                &["mode"]
            )
            .map_err(|e| register_error("demo_stores_provisioned_total", e))?,

            demo_provision_failures_total: register_counter_vec!(
                "leancrm_demo_provision_failures_total",
                "Total number of failed demo store provisioning attempts",
                &["mode"]
            )
            .map_err(|e| register_error("demo_provision_failures_total", e))?,

            demo_sessions_expired_total: register_counter_vec!(
                "leancrm_demo_sessions_expired_total",
                "Total number of demo stores destroyed on access after expiry",
                &["mode"]
            )
            .map_err(|e| register_error("demo_sessions_expired_total", e))?,

            demo_purge_sweeps_total: register_counter_vec!(
                "leancrm_demo_purge_sweeps_total",
                "Total number of demo purge sweeps",
                &["status"]
            )
            .map_err(|e| register_error("demo_purge_sweeps_total", e))?,

            demo_purge_deletions_total: register_counter_vec!(
                "leancrm_demo_purge_deletions_total",
                "Total number of items removed by demo purge sweeps",
                &["kind"]
            )
            .map_err(|e| register_error("demo_purge_deletions_total", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_provisioned(&self, mode: IdentityMode) {
        self.demo_stores_provisioned_total
            .with_label_values(&[mode.as_str()])
            .inc();
    }

    pub fn record_provision_failure(&self, mode: IdentityMode) {
        self.demo_provision_failures_total
            .with_label_values(&[mode.as_str()])
            .inc();
    }

    pub fn record_expired(&self, mode: IdentityMode) {
        self.demo_sessions_expired_total
            .with_label_values(&[mode.as_str()])
            .inc();
    }

    /// Record one reaper run and everything it removed.
    pub fn record_sweep(&self, report: &SweepReport) {
        let status = if report.errors.is_empty() { "clean" } else { "partial" };
        self.demo_purge_sweeps_total
            .with_label_values(&[status])
            .inc();

        for (kind, count) in [
            ("store", report.deleted_stores),
            ("upload_dir", report.deleted_upload_dirs),
            ("temp_artifact", report.deleted_temp_artifacts),
            ("token", report.evicted_tokens),
        ] {
            if count > 0 {
                self.demo_purge_deletions_total
                    .with_label_values(&[kind])
                    .inc_by(count as f64);
            }
        }
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (status = 200, description = "Prometheus metrics in text format", content_type = "text/plain"),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}
