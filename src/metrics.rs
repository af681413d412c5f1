/// Metrics and telemetry for tailwho
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - Identity lookup latency (one sample per resolution attempt)
/// - Identity resolution outcomes
/// - HTTP request counts and latencies
///
/// A single `Metrics` value is created at startup and shared through the
/// application context. Prometheus collectors are internally atomic, so
/// concurrent handlers can record without extra locking.
use crate::error::{ServiceError, ServiceResult};
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::{sync::Arc, time::Instant};

/// Buckets for the lookup latency histogram, in milliseconds
const LOOKUP_BUCKETS_MS: &[f64] = &[
    0.5, 1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
];

/// Process-scoped metrics aggregate
pub struct Metrics {
    registry: Registry,
    lookup_duration_ms: Histogram,
    resolutions_total: IntCounterVec,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
}

impl Metrics {
    /// Create and register all collectors
    pub fn new() -> ServiceResult<Self> {
        let registry = Registry::new();

        let lookup_duration_ms = Histogram::with_opts(
            HistogramOpts::new(
                "identity_lookup_duration_ms",
                "Latency of identity-lookup agent calls in milliseconds",
            )
            .buckets(LOOKUP_BUCKETS_MS.to_vec()),
        )
        .map_err(metrics_error)?;

        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "identity_resolutions_total",
                "Total number of identity resolutions by outcome",
            ),
            &["outcome"],
        )
        .map_err(metrics_error)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
        )
        .map_err(metrics_error)?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latencies in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
            &["method", "path"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(lookup_duration_ms.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(resolutions_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(http_requests_total.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .map_err(metrics_error)?;

        #[cfg(target_os = "linux")]
        registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            lookup_duration_ms,
            resolutions_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Record one identity lookup latency sample
    pub fn observe(&self, duration_ms: f64) {
        self.lookup_duration_ms.observe(duration_ms);
    }

    /// Number of lookup latency samples recorded so far
    pub fn lookup_samples(&self) -> u64 {
        self.lookup_duration_ms.get_sample_count()
    }

    /// Record a resolution outcome
    pub fn record_resolution(&self, outcome: &str) {
        self.resolutions_total.with_label_values(&[outcome]).inc();
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        self.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration);
    }

    /// Render metrics in Prometheus text format
    pub fn export(&self) -> ServiceResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| ServiceError::Internal(e.to_string()))
    }
}

fn metrics_error(err: prometheus::Error) -> ServiceError {
    ServiceError::Internal(format!("metrics: {}", err))
}

/// Middleware recording count and latency of every HTTP request
pub async fn track_http_requests(
    State(metrics): State<Arc<Metrics>>,
    req: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    // Matched route keeps label cardinality bounded
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    metrics.record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}
