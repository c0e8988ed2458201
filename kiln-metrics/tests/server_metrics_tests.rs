//! Integration tests for kiln-metrics

use kiln_metrics::*;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_independent_instances() {
    let a = ServerMetrics::new().unwrap();
    let b = ServerMetrics::new().unwrap();

    a.record_request(200, Duration::from_millis(1));
    assert_eq!(a.requests_with_status(200), 1);
    assert_eq!(b.requests_with_status(200), 0);
}

#[test]
fn test_concurrent_increments() {
    let metrics = Arc::new(ServerMetrics::new().unwrap());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metrics = Arc::clone(&metrics);
            thread::spawn(move || {
                for _ in 0..250 {
                    metrics.record_request(200, Duration::from_micros(50));
                    metrics.record_cache_lookup("responses", true);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(metrics.requests_with_status(200), 2000);
    assert_eq!(metrics.completed_requests(), 2000);
    assert_eq!(metrics.cache_hits("responses"), 2000);
}

#[test]
fn test_worker_gauge_tracks_leases() {
    let metrics = ServerMetrics::new().unwrap();
    {
        let _one = metrics.worker_leased();
        let _two = metrics.worker_leased();
        assert_eq!(metrics.active_workers(), 2);
    }
    assert_eq!(metrics.active_workers(), 0);
}

#[test]
fn test_export_contains_families() {
    let metrics = ServerMetrics::new().unwrap();
    metrics.record_request(413, Duration::from_millis(2));
    metrics.record_protocol_violation("line_too_long");
    metrics.record_drop();

    let text = metrics.export();
    assert!(text.contains("kiln_requests_total{status=\"413\"} 1"));
    assert!(text.contains("kiln_protocol_violations_total{kind=\"line_too_long\"} 1"));
    assert!(text.contains("kiln_dropped_requests_total 1"));
}
