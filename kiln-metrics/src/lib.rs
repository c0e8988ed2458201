//! Prometheus metrics for the Kiln request cycle
//!
//! Each engine owns a [`ServerMetrics`] with its own [`Registry`], so two
//! servers in one process (or two tests) never collide on metric names.
//!
//! # Quick Start
//!
//! ```
//! use kiln_metrics::ServerMetrics;
//! use std::time::Duration;
//!
//! let metrics = ServerMetrics::new().unwrap();
//! metrics.record_request(200, Duration::from_millis(3));
//! assert_eq!(metrics.requests_with_status(200), 1);
//!
//! let text = metrics.export();
//! assert!(text.contains("kiln_requests_total"));
//! ```

pub mod registry;
mod server;

pub use prometheus;
pub use registry::*;
pub use server::{ServerMetrics, WorkerGauge};

use once_cell::sync::Lazy;
use prometheus::{Encoder, Registry, TextEncoder};

/// Process-wide registry for application metrics
static DEFAULT_REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Get the process-wide metrics registry
pub fn default_registry() -> &'static Registry {
    &DEFAULT_REGISTRY
}

/// Export metrics from a specific registry in Prometheus text format
pub fn export_metrics_from_registry(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|_| String::from("# Error converting metrics to UTF-8\n"))
}
