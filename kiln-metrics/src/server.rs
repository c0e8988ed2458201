//! Request-cycle metrics owned by one server instance

use crate::registry::*;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::time::Duration;

/// All counters and timers the request pipeline reports into.
///
/// Cloning is cheap; every clone reports into the same registry.
#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,
    requests: IntCounterVec,
    request_duration: Histogram,
    read_duration: Histogram,
    compression_duration: Histogram,
    dropped: IntCounter,
    protocol_violations: IntCounterVec,
    cache_hits: IntCounterVec,
    cache_misses: IntCounterVec,
    compression_failures: IntCounter,
    active_workers: IntGauge,
    rejected_connections: IntCounter,
}

impl ServerMetrics {
    /// Create metrics in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Create metrics inside an existing registry.
    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            requests: register_int_counter_vec(
                &registry,
                "kiln_requests_total",
                "Completed request cycles by response status",
                &["status"],
            )?,
            request_duration: register_latency_histogram(
                &registry,
                "kiln_request_duration_seconds",
                "Time from worker lease to worker return",
            )?,
            read_duration: register_latency_histogram(
                &registry,
                "kiln_read_duration_seconds",
                "Time spent reading and parsing the request head and body",
            )?,
            compression_duration: register_latency_histogram(
                &registry,
                "kiln_compression_duration_seconds",
                "Time spent gzip-encoding response bodies",
            )?,
            dropped: register_int_counter(
                &registry,
                "kiln_dropped_requests_total",
                "Requests dropped by middleware without a response",
            )?,
            protocol_violations: register_int_counter_vec(
                &registry,
                "kiln_protocol_violations_total",
                "Requests rejected while parsing",
                &["kind"],
            )?,
            cache_hits: register_int_counter_vec(
                &registry,
                "kiln_cache_hits_total",
                "Cache reads that returned an entry",
                &["cache"],
            )?,
            cache_misses: register_int_counter_vec(
                &registry,
                "kiln_cache_misses_total",
                "Cache reads that missed",
                &["cache"],
            )?,
            compression_failures: register_int_counter(
                &registry,
                "kiln_compression_failures_total",
                "Responses sent uncompressed after an encoder error",
            )?,
            active_workers: register_int_gauge(
                &registry,
                "kiln_active_workers",
                "Workers currently leased from the pool",
            )?,
            rejected_connections: register_int_counter(
                &registry,
                "kiln_rejected_connections_total",
                "Connections closed by the acceptor filter chain",
            )?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record a finished cycle.
    pub fn record_request(&self, status: u16, elapsed: Duration) {
        self.requests
            .with_label_values(&[status.to_string().as_str()])
            .inc();
        self.request_duration.observe(elapsed.as_secs_f64());
    }

    pub fn observe_read(&self, elapsed: Duration) {
        self.read_duration.observe(elapsed.as_secs_f64());
    }

    pub fn observe_compression(&self, elapsed: Duration) {
        self.compression_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_drop(&self) {
        self.dropped.inc();
    }

    pub fn record_protocol_violation(&self, kind: &str) {
        self.protocol_violations.with_label_values(&[kind]).inc();
    }

    pub fn record_cache_lookup(&self, cache: &str, hit: bool) {
        if hit {
            self.cache_hits.with_label_values(&[cache]).inc();
        } else {
            self.cache_misses.with_label_values(&[cache]).inc();
        }
    }

    pub fn record_compression_failure(&self) {
        self.compression_failures.inc();
    }

    pub fn record_rejected_connection(&self) {
        self.rejected_connections.inc();
    }

    /// Track one leased worker until the returned guard drops.
    pub fn worker_leased(&self) -> WorkerGauge {
        self.active_workers.inc();
        WorkerGauge {
            gauge: self.active_workers.clone(),
        }
    }

    // ========================================================================
    // Readers
    // ========================================================================

    pub fn requests_with_status(&self, status: u16) -> u64 {
        self.requests
            .with_label_values(&[status.to_string().as_str()])
            .get()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn protocol_violations(&self, kind: &str) -> u64 {
        self.protocol_violations.with_label_values(&[kind]).get()
    }

    pub fn cache_hits(&self, cache: &str) -> u64 {
        self.cache_hits.with_label_values(&[cache]).get()
    }

    pub fn cache_misses(&self, cache: &str) -> u64 {
        self.cache_misses.with_label_values(&[cache]).get()
    }

    pub fn compression_failures(&self) -> u64 {
        self.compression_failures.get()
    }

    pub fn rejected_connections(&self) -> u64 {
        self.rejected_connections.get()
    }

    pub fn active_workers(&self) -> i64 {
        self.active_workers.get()
    }

    pub fn completed_requests(&self) -> u64 {
        self.request_duration.get_sample_count()
    }

    /// Prometheus text exposition of this registry.
    pub fn export(&self) -> String {
        crate::export_metrics_from_registry(&self.registry)
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics")
            .field("completed_requests", &self.completed_requests())
            .field("active_workers", &self.active_workers())
            .finish()
    }
}

/// Decrements the active-worker gauge on drop.
#[derive(Debug)]
pub struct WorkerGauge {
    gauge: IntGauge,
}

impl Drop for WorkerGauge {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}
