use std::time::Duration;

use crate::http::{HttpMethod, TransportKind};
use crate::runner::RunState;

use super::aggregate::percentile;
use super::*;

fn metric(path: &str, status: u16, latency_ms: f64) -> MetricRecord {
    MetricRecord {
        method: HttpMethod::Get,
        path: path.to_owned(),
        status: Some(status),
        latency_ms: Some(latency_ms),
        error: None,
        screen: None,
        time: wall_clock_seconds(),
    }
}

fn transport_metric(path: &str) -> MetricRecord {
    MetricRecord {
        method: HttpMethod::Get,
        path: path.to_owned(),
        status: None,
        latency_ms: Some(12.0),
        error: Some(TransportKind::ConnectionRefused),
        screen: None,
        time: wall_clock_seconds(),
    }
}

#[test]
fn totals_match_ingested_counts() {
    let stats = Stats::new();
    stats.record_metric(metric("/a", 200, 10.0));
    stats.record_metric(metric("/a", 500, 20.0));
    stats.record_metric(transport_metric("/b"));

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 1);
    assert_eq!(snapshot.total_requests, 3);
    assert_eq!(snapshot.total_errors, 2);
    assert_eq!(snapshot.error_count, 2);
}

#[test]
fn cumulative_endpoint_shape() {
    let stats = Stats::new();
    stats.record_metric(metric("/api/items", 200, 25.0));
    stats.record_metric(metric("/api/items", 200, 75.0));

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 1);
    let entry = &snapshot.cumulative_endpoints[0];
    assert_eq!(entry.name, "GET    /api/items");
    assert_eq!(entry.count, 2);
    assert_eq!(entry.avg, 50.0);
    assert_eq!(entry.min, 25.0);
    assert_eq!(entry.max, 75.0);
    assert_eq!(entry.errors, 0);
}

#[test]
fn snapshots_consume_the_interval() {
    let stats = Stats::new();
    stats.record_metric(metric("/a", 200, 10.0));
    stats.record_metric(metric("/a", 200, 20.0));

    let first = stats.snapshot(RunState::Running, Duration::from_secs(1), 1);
    assert_eq!(first.endpoints.len(), 1);
    assert_eq!(first.endpoints[0].count, 2);

    let second = stats.snapshot(RunState::Running, Duration::from_secs(2), 1);
    assert_eq!(second.rps, 0.0);
    assert!(second.endpoints.is_empty());
    assert_eq!(second.total_requests, 2);
    assert_eq!(second.cumulative_endpoints[0].count, 2);
    assert!(second.total_requests >= first.total_requests);
}

#[test]
fn status_4xx_and_5xx_count_as_errors() {
    let stats = Stats::new();
    stats.record_metric(metric("/a", 200, 1.0));
    stats.record_metric(metric("/a", 301, 1.0));
    stats.record_metric(metric("/a", 404, 1.0));
    stats.record_metric(metric("/a", 503, 1.0));

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 1);
    assert_eq!(snapshot.endpoints[0].errors, 2);
}

#[test]
fn groups_sort_by_method_then_path() {
    let stats = Stats::new();
    let mut post = metric("/a", 200, 1.0);
    post.method = HttpMethod::Post;
    stats.record_metric(post);
    stats.record_metric(metric("/b", 200, 1.0));
    stats.record_metric(metric("/a", 200, 1.0));

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 1);
    let names: Vec<&str> = snapshot
        .endpoints
        .iter()
        .map(|e| e.name.as_str())
        .collect();
    assert_eq!(names, vec!["GET    /a", "GET    /b", "POST   /a"]);
}

#[test]
fn percentile_uses_ceiling_rank() {
    let sorted: Vec<f64> = (1..=100).map(f64::from).collect();
    assert_eq!(percentile(&sorted, 50), 50.0);
    assert_eq!(percentile(&sorted, 90), 90.0);
    assert_eq!(percentile(&sorted, 99), 99.0);

    let small = [10.0, 20.0];
    assert_eq!(percentile(&small, 50), 10.0);
    assert_eq!(percentile(&small, 99), 20.0);

    assert_eq!(percentile(&[], 95), 0.0);
    assert_eq!(percentile(&[42.0], 50), 42.0);
}

#[test]
fn percentiles_are_monotonic_and_bounded() {
    let stats = Stats::new();
    for latency in [3.0, 1.0, 4.0, 1.5, 9.0, 2.6, 5.3, 5.8] {
        stats.record_metric(metric("/a", 200, latency));
    }

    let summary_entry = &stats.summary().endpoints[0];
    assert!(summary_entry.p50_ms <= summary_entry.p95_ms);
    assert!(summary_entry.p95_ms <= summary_entry.p99_ms);
    assert!(summary_entry.p50_ms >= summary_entry.min_ms);
    assert!(summary_entry.p99_ms <= summary_entry.max_ms);
}

#[test]
fn transport_latencies_are_excluded_when_null() {
    let stats = Stats::new();
    let mut lost = transport_metric("/a");
    lost.latency_ms = None;
    stats.record_metric(lost);
    stats.record_metric(metric("/a", 200, 30.0));

    let entry = &stats.summary().endpoints[0];
    assert_eq!(entry.count, 2);
    assert_eq!(entry.errors, 1);
    assert_eq!(entry.avg_ms, 30.0);
}

#[test]
fn recent_errors_keep_the_last_five() {
    let stats = Stats::new();
    {
        let mut inner = stats.lock();
        for n in 0..8 {
            inner.scenario_errors.push(ScenarioError {
                user_id: n,
                screen: None,
                message: format!("failure {}", n),
                time: wall_clock_seconds(),
            });
        }
    }

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 0);
    assert_eq!(snapshot.recent_errors.len(), 5);
    assert_eq!(snapshot.recent_errors[0].message, "failure 3");
    assert_eq!(snapshot.recent_errors[4].message, "failure 7");
}

#[test]
fn user_counters_feed_the_snapshot() {
    let stats = Stats::new();
    stats.user_started();
    stats.user_started();
    stats.user_finished();

    let snapshot = stats.snapshot(RunState::Running, Duration::from_secs(1), 2);
    assert_eq!(snapshot.total_users, 2);
    assert_eq!(snapshot.finished_users, 1);
    assert_eq!(snapshot.active_users, 2);
}

#[test]
fn report_document_has_the_persisted_shape() {
    let stats = Stats::new();
    stats.user_started();
    stats.record_metric(metric("/api/items", 200, 25.0));
    stats.record_metric(transport_metric("/api/items"));
    stats.finalize(Duration::from_secs(10));

    let doc = stats.report_document();
    assert_eq!(doc["duration_seconds"], 10.0);
    assert_eq!(doc["total_requests"], 2);
    assert_eq!(doc["total_users"], 1);
    assert_eq!(doc["total_errors"], 1);
    assert_eq!(doc["endpoints"][0]["endpoint"], "GET /api/items");
    assert_eq!(doc["raw_metrics"][0]["method"], "GET");
    assert_eq!(doc["raw_metrics"][1]["status"], serde_json::Value::Null);
    assert_eq!(doc["raw_metrics"][1]["error"], "connection_refused");
}

#[test]
fn summary_reflects_finalized_duration() {
    let stats = Stats::new();
    stats.finalize(Duration::from_millis(1500));
    assert_eq!(stats.summary().duration, Duration::from_millis(1500));
}
