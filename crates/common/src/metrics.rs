//! Metrics collection for InferLink
//!
//! Client-side Prometheus metrics. Recording is a handful of atomic
//! operations per request and never blocks dispatch.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics registry for InferLink
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub requests: RequestMetrics,
    pub batches: BatchMetrics,
}

/// Per-request metrics
#[derive(Debug, Clone)]
pub struct RequestMetrics {
    /// Total number of inference requests sent
    pub requests_total: IntCounter,

    /// Total number of successful requests
    pub requests_success: IntCounter,

    /// Total number of failed requests
    pub requests_failed: IntCounter,

    /// Request round-trip duration, including encode and decode
    pub request_duration: Histogram,

    /// Requests currently in flight
    pub in_flight: IntGauge,

    /// Tensor conversions rejected by the codec
    pub codec_failures: IntCounter,
}

/// Batch-level metrics
#[derive(Debug, Clone)]
pub struct BatchMetrics {
    /// Batches accepted for dispatch
    pub batches_total: IntCounter,

    /// Batches rejected by validation
    pub batches_rejected: IntCounter,

    /// Batch size histogram
    pub batch_size: Histogram,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry =
        MetricsRegistry::new().expect("client metrics use fixed, valid descriptors");
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = IntCounter::new(
            "inferlink_requests_total",
            "Total number of inference requests sent",
        )?;

        let requests_success = IntCounter::new(
            "inferlink_requests_success_total",
            "Total number of successful inference requests",
        )?;

        let requests_failed = IntCounter::new(
            "inferlink_requests_failed_total",
            "Total number of failed inference requests",
        )?;

        let request_duration = Histogram::with_opts(
            HistogramOpts::new(
                "inferlink_request_duration_seconds",
                "Inference request round-trip duration in seconds",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let in_flight = IntGauge::new(
            "inferlink_requests_in_flight",
            "Current number of in-flight inference requests",
        )?;

        let codec_failures = IntCounter::new(
            "inferlink_codec_failures_total",
            "Tensor conversions rejected by the codec",
        )?;

        let batches_total = IntCounter::new(
            "inferlink_batches_total",
            "Total number of batches dispatched",
        )?;

        let batches_rejected = IntCounter::new(
            "inferlink_batches_rejected_total",
            "Total number of batches rejected by validation",
        )?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new("inferlink_batch_size", "Requests per batch")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0]),
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_success.clone()))?;
        registry.register(Box::new(requests_failed.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(codec_failures.clone()))?;

        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(batches_rejected.clone()))?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(MetricsRegistry {
            registry,
            requests: RequestMetrics {
                requests_total,
                requests_success,
                requests_failed,
                request_duration,
                in_flight,
                codec_failures,
            },
            batches: BatchMetrics {
                batches_total,
                batches_rejected,
                batch_size,
            },
        })
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> prometheus::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Helper trait for measuring latency
pub trait LatencyTimer {
    /// Observe the duration of a closure
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R;
}

impl LatencyTimer for Histogram {
    fn time<F, R>(&self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let start = std::time::Instant::now();
        let result = f();
        self.observe(start.elapsed().as_secs_f64());
        result
    }
}
