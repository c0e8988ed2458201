//! Registration helpers bound to an explicit registry

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

/// Latency buckets in seconds, from 100µs to 10s
pub const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Register an integer counter
pub fn register_int_counter(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntCounter, prometheus::Error> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Register an integer counter with labels
pub fn register_int_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    label_names: &[&str],
) -> Result<IntCounterVec, prometheus::Error> {
    let counter = IntCounterVec::new(Opts::new(name, help), label_names)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Register an integer gauge
pub fn register_int_gauge(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<IntGauge, prometheus::Error> {
    let gauge = IntGauge::new(name, help)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

/// Register a latency histogram using [`LATENCY_BUCKETS`]
pub fn register_latency_histogram(
    registry: &Registry,
    name: &str,
    help: &str,
) -> Result<Histogram, prometheus::Error> {
    let histogram =
        Histogram::with_opts(HistogramOpts::new(name, help).buckets(LATENCY_BUCKETS.to_vec()))?;
    registry.register(Box::new(histogram.clone()))?;
    Ok(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = Registry::new();
        register_int_counter(&registry, "dup_total", "first").unwrap();
        assert!(register_int_counter(&registry, "dup_total", "second").is_err());
    }

    #[test]
    fn test_histogram_observes() {
        let registry = Registry::new();
        let histogram = register_latency_histogram(&registry, "lat_seconds", "latency").unwrap();
        histogram.observe(0.002);
        assert_eq!(histogram.get_sample_count(), 1);
    }
}
