use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::http::{HttpMethod, TransportKind};

/// One HTTP round-trip as seen by the aggregator.
///
/// `status` and `error` are mutually exclusive: a transport failure never
/// produced a status line, and a reply always did.
#[derive(Debug, Clone, Serialize)]
pub struct MetricRecord {
    pub method: HttpMethod,
    pub path: String,
    pub status: Option<u16>,
    pub latency_ms: Option<f64>,
    pub error: Option<TransportKind>,
    pub screen: Option<String>,
    pub time: f64,
}

impl MetricRecord {
    /// Functional error for aggregation purposes: transport failure or a
    /// status outside 2xx/3xx.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some() || matches!(self.status, Some(status) if status >= 400)
    }
}

/// A screen failure, a missing symbol at execution time, or an explicit
/// `record_scenario_error` call.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioError {
    pub user_id: u64,
    pub screen: Option<String>,
    pub message: String,
    pub time: f64,
}

/// Wall-clock seconds since the Unix epoch.
#[must_use]
pub fn wall_clock_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}
