use std::collections::BTreeMap;

use serde::Serialize;

use super::types::MetricRecord;

/// Interval view of one endpoint, emitted in live snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalEndpoint {
    pub name: String,
    pub count: u64,
    pub avg: f64,
    pub p95: f64,
    pub p99: f64,
    pub errors: u64,
}

/// Cumulative view of one endpoint, emitted in live snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct CumulativeEndpoint {
    pub name: String,
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub errors: u64,
}

/// Full per-endpoint aggregate for the final summary and the JSON report.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointSummary {
    pub endpoint: String,
    pub count: u64,
    pub errors: u64,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

struct Group {
    count: u64,
    errors: u64,
    latencies: Vec<f64>,
}

fn group_metrics(metrics: &[MetricRecord]) -> BTreeMap<(&'static str, String), Group> {
    let mut groups: BTreeMap<(&'static str, String), Group> = BTreeMap::new();
    for metric in metrics {
        let key = (metric.method.as_str(), metric.path.clone());
        let group = groups.entry(key).or_insert_with(|| Group {
            count: 0,
            errors: 0,
            latencies: Vec::new(),
        });
        group.count += 1;
        if metric.is_error() {
            group.errors += 1;
        }
        if let Some(latency) = metric.latency_ms {
            group.latencies.push(latency);
        }
    }
    for group in groups.values_mut() {
        group
            .latencies
            .sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    }
    groups
}

/// Nearest-rank percentile with a ceiling index over an ascending slice:
/// `idx = max(ceil(n * p / 100) - 1, 0)`; 0 for an empty set.
pub(crate) fn percentile(sorted: &[f64], p: usize) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (sorted.len() * p).div_ceil(100).saturating_sub(1);
    sorted.get(idx.min(sorted.len() - 1)).copied().unwrap_or(0.0)
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn average(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    round_tenth(sorted.iter().sum::<f64>() / sorted.len() as f64)
}

/// Live-snapshot display label: method left-padded to six columns.
fn display_name(method: &str, path: &str) -> String {
    format!("{:<6} {}", method, path)
}

pub(crate) fn interval_endpoints(metrics: &[MetricRecord]) -> Vec<IntervalEndpoint> {
    group_metrics(metrics)
        .into_iter()
        .map(|((method, path), group)| IntervalEndpoint {
            name: display_name(method, &path),
            count: group.count,
            avg: average(&group.latencies),
            p95: percentile(&group.latencies, 95),
            p99: percentile(&group.latencies, 99),
            errors: group.errors,
        })
        .collect()
}

pub(crate) fn cumulative_endpoints(metrics: &[MetricRecord]) -> Vec<CumulativeEndpoint> {
    group_metrics(metrics)
        .into_iter()
        .map(|((method, path), group)| CumulativeEndpoint {
            name: display_name(method, &path),
            count: group.count,
            avg: average(&group.latencies),
            min: group.latencies.first().copied().unwrap_or(0.0),
            max: group.latencies.last().copied().unwrap_or(0.0),
            p50: percentile(&group.latencies, 50),
            p95: percentile(&group.latencies, 95),
            p99: percentile(&group.latencies, 99),
            errors: group.errors,
        })
        .collect()
}

pub(crate) fn endpoint_summaries(metrics: &[MetricRecord]) -> Vec<EndpointSummary> {
    group_metrics(metrics)
        .into_iter()
        .map(|((method, path), group)| EndpointSummary {
            endpoint: format!("{} {}", method, path),
            count: group.count,
            errors: group.errors,
            avg_ms: average(&group.latencies),
            min_ms: group.latencies.first().copied().unwrap_or(0.0),
            max_ms: group.latencies.last().copied().unwrap_or(0.0),
            p50_ms: percentile(&group.latencies, 50),
            p90_ms: percentile(&group.latencies, 90),
            p95_ms: percentile(&group.latencies, 95),
            p99_ms: percentile(&group.latencies, 99),
        })
        .collect()
}
