//! Run-wide metric aggregation.
//!
//! A single coarse mutex guards the flat metric log; per-endpoint maps are
//! built lazily at snapshot time so the ingestion path stays O(1). Snapshots
//! are interval-consuming: the runner's snapshot ticker is the only caller
//! and fans the result out through a watch channel.

mod aggregate;
mod types;

#[cfg(test)]
mod tests;

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::time::Instant;

pub use aggregate::{CumulativeEndpoint, EndpointSummary, IntervalEndpoint};
pub use types::{MetricRecord, ScenarioError, wall_clock_seconds};

use aggregate::{cumulative_endpoints, endpoint_summaries, interval_endpoints, round_tenth};

use crate::http::Context;
use crate::runner::RunState;

/// How many scenario errors a snapshot carries.
const RECENT_ERROR_WINDOW: usize = 5;

#[derive(Debug, Default)]
struct StatsInner {
    all_metrics: Vec<MetricRecord>,
    interval_metrics: Vec<MetricRecord>,
    started: u64,
    finished: u64,
    scenario_errors: Vec<ScenarioError>,
    last_snapshot: Option<Instant>,
    duration: Option<Duration>,
}

/// Thread-safe ingestion of request metrics and user lifecycle counts.
#[derive(Debug, Default)]
pub struct Stats {
    inner: Mutex<StatsInner>,
}

/// Live view emitted once per second to the terminal monitor and every
/// dashboard stream client.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: RunState,
    pub rps: f64,
    pub error_count: u64,
    pub total_requests: u64,
    pub total_errors: u64,
    pub elapsed: f64,
    pub active_users: usize,
    pub total_users: u64,
    pub finished_users: u64,
    pub endpoints: Vec<IntervalEndpoint>,
    pub cumulative_endpoints: Vec<CumulativeEndpoint>,
    pub recent_errors: Vec<RecentError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub user_id: u64,
    pub screen: Option<String>,
    pub message: String,
}

impl Snapshot {
    /// Placeholder frame for streams opened before any run starts.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            state: RunState::Idle,
            rps: 0.0,
            error_count: 0,
            total_requests: 0,
            total_errors: 0,
            elapsed: 0.0,
            active_users: 0,
            total_users: 0,
            finished_users: 0,
            endpoints: Vec::new(),
            cumulative_endpoints: Vec::new(),
            recent_errors: Vec::new(),
        }
    }
}

/// Read-only final aggregate handed back by `Runner::run`.
#[derive(Debug, Clone)]
pub struct Summary {
    pub duration: Duration,
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_users: u64,
    pub finished_users: u64,
    pub endpoints: Vec<EndpointSummary>,
    pub scenario_errors: Vec<ScenarioError>,
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StatsInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_metric(&self, metric: MetricRecord) {
        let mut inner = self.lock();
        inner.interval_metrics.push(metric.clone());
        inner.all_metrics.push(metric);
    }

    /// Moves a retiring user's metric and error buffers into the aggregate.
    pub fn record_user(&self, ctx: &mut Context) {
        let (metrics, errors) = ctx.take_buffers();
        if metrics.is_empty() && errors.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.interval_metrics.extend(metrics.iter().cloned());
        inner.all_metrics.extend(metrics);
        inner.scenario_errors.extend(errors);
    }

    pub fn user_started(&self) {
        self.lock().started += 1;
    }

    pub fn user_finished(&self) {
        self.lock().finished += 1;
    }

    /// Consumes the interval buffer and builds the live view.
    ///
    /// Interval windows are monotonic and non-overlapping across calls on
    /// the same aggregator; rps is measured against the wall time since the
    /// previous snapshot.
    pub fn snapshot(&self, state: RunState, elapsed: Duration, active_users: usize) -> Snapshot {
        let mut inner = self.lock();
        let now = Instant::now();
        let window_secs = inner
            .last_snapshot
            .map_or_else(|| elapsed.as_secs_f64(), |prev| now.duration_since(prev).as_secs_f64())
            .max(0.001);
        inner.last_snapshot = Some(now);

        let interval = std::mem::take(&mut inner.interval_metrics);
        let error_count = interval.iter().filter(|metric| metric.is_error()).count() as u64;
        let total_errors = inner
            .all_metrics
            .iter()
            .filter(|metric| metric.is_error())
            .count() as u64;

        let recent_errors = inner
            .scenario_errors
            .iter()
            .rev()
            .take(RECENT_ERROR_WINDOW)
            .rev()
            .map(|err| RecentError {
                user_id: err.user_id,
                screen: err.screen.clone(),
                message: err.message.clone(),
            })
            .collect();

        Snapshot {
            state,
            rps: round_tenth(interval.len() as f64 / window_secs),
            error_count,
            total_requests: inner.all_metrics.len() as u64,
            total_errors,
            elapsed: round_tenth(elapsed.as_secs_f64()),
            active_users,
            total_users: inner.started,
            finished_users: inner.finished,
            endpoints: interval_endpoints(&interval),
            cumulative_endpoints: cumulative_endpoints(&inner.all_metrics),
            recent_errors,
        }
    }

    /// Stamps the run's elapsed duration at termination.
    pub fn finalize(&self, duration: Duration) {
        self.lock().duration = Some(duration);
    }

    #[must_use]
    pub fn summary(&self) -> Summary {
        let inner = self.lock();
        Summary {
            duration: inner.duration.unwrap_or_default(),
            total_requests: inner.all_metrics.len() as u64,
            total_errors: inner
                .all_metrics
                .iter()
                .filter(|metric| metric.is_error())
                .count() as u64,
            total_users: inner.started,
            finished_users: inner.finished,
            endpoints: endpoint_summaries(&inner.all_metrics),
            scenario_errors: inner.scenario_errors.clone(),
        }
    }

    /// Deterministic serializable form of the whole run, written to the
    /// results file on normal termination.
    #[must_use]
    pub fn report_document(&self) -> Value {
        let inner = self.lock();
        let duration = inner.duration.unwrap_or_default();
        let scenario_errors: Vec<Value> = inner
            .scenario_errors
            .iter()
            .map(|err| {
                json!({
                    "user_id": err.user_id,
                    "screen": &err.screen,
                    "message": &err.message,
                })
            })
            .collect();

        json!({
            "timestamp": chrono::Local::now().to_rfc3339(),
            "duration_seconds": round_tenth(duration.as_secs_f64()),
            "total_requests": inner.all_metrics.len() as u64,
            "total_users": inner.started,
            "total_errors": inner
                .all_metrics
                .iter()
                .filter(|metric| metric.is_error())
                .count() as u64,
            "endpoints": endpoint_summaries(&inner.all_metrics),
            "scenario_errors": scenario_errors,
            "raw_metrics": &inner.all_metrics,
        })
    }
}
