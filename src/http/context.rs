use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;

use reqwest::Client;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::config::Configuration;
use crate::stats::{MetricRecord, ScenarioError, wall_clock_seconds};

use super::{HttpMethod, Response, TransportKind};

/// Boxed failure a screen callable may surface.
pub type ScreenError = Box<dyn Error + Send + Sync>;
pub type ScreenResult = Result<(), ScreenError>;

/// Per-user state: a lazy HTTP client bound to the base URL, scoped scratch
/// storage, and the metric/error buffers handed to the aggregator when the
/// user retires.
///
/// A context is exclusively owned by the virtual-user task that created it;
/// nothing here is synchronized.
#[derive(Debug)]
pub struct Context {
    user_id: u64,
    config: Arc<Configuration>,
    store: HashMap<String, Value>,
    default_headers: BTreeMap<String, String>,
    metrics: Vec<MetricRecord>,
    scenario_errors: Vec<ScenarioError>,
    current_screen: Option<String>,
    aborted: bool,
    client: Option<Client>,
}

impl Context {
    #[must_use]
    pub fn new(user_id: u64, config: Arc<Configuration>) -> Self {
        let mut default_headers = BTreeMap::new();
        default_headers.insert("Content-Type".to_owned(), "application/json".to_owned());
        Self {
            user_id,
            config,
            store: HashMap::new(),
            default_headers,
            metrics: Vec::new(),
            scenario_errors: Vec::new(),
            current_screen: None,
            aborted: false,
            client: None,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// User-level scratch shared across this user's screens.
    #[must_use]
    pub fn store(&self) -> &HashMap<String, Value> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.store
    }

    pub fn set_default_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.default_headers.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn default_headers(&self) -> &BTreeMap<String, String> {
        &self.default_headers
    }

    #[must_use]
    pub fn current_screen(&self) -> Option<&str> {
        self.current_screen.as_deref()
    }

    pub(crate) fn set_current_screen(&mut self, screen: &str) {
        self.current_screen = Some(screen.to_owned());
    }

    #[must_use]
    pub fn aborted(&self) -> bool {
        self.aborted
    }

    /// Stops step execution for this user at the next step boundary. The
    /// flag is monotonic; there is no un-abort.
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    pub fn record_scenario_error(&mut self, screen: Option<&str>, message: impl Into<String>) {
        self.scenario_errors.push(ScenarioError {
            user_id: self.user_id,
            screen: screen.map(str::to_owned),
            message: message.into(),
            time: wall_clock_seconds(),
        });
    }

    #[must_use]
    pub fn metrics(&self) -> &[MetricRecord] {
        &self.metrics
    }

    #[must_use]
    pub fn scenario_errors(&self) -> &[ScenarioError] {
        &self.scenario_errors
    }

    /// Releases the HTTP client. Safe when never opened or already closed.
    pub fn close(&mut self) {
        self.client = None;
    }

    /// Hands the metric and error buffers to the aggregator in bulk.
    pub(crate) fn take_buffers(&mut self) -> (Vec<MetricRecord>, Vec<ScenarioError>) {
        (
            std::mem::take(&mut self.metrics),
            std::mem::take(&mut self.scenario_errors),
        )
    }

    pub fn get(&mut self, path: impl Into<String>) -> RequestSpec<'_> {
        self.request(HttpMethod::Get, path)
    }

    pub fn post(&mut self, path: impl Into<String>) -> RequestSpec<'_> {
        self.request(HttpMethod::Post, path)
    }

    pub fn put(&mut self, path: impl Into<String>) -> RequestSpec<'_> {
        self.request(HttpMethod::Put, path)
    }

    pub fn patch(&mut self, path: impl Into<String>) -> RequestSpec<'_> {
        self.request(HttpMethod::Patch, path)
    }

    pub fn delete(&mut self, path: impl Into<String>) -> RequestSpec<'_> {
        self.request(HttpMethod::Delete, path)
    }

    pub fn request(&mut self, method: HttpMethod, path: impl Into<String>) -> RequestSpec<'_> {
        RequestSpec {
            ctx: self,
            method,
            path: path.into(),
            params: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            name: None,
        }
    }

    /// The lazy client; `Client` is internally reference-counted, so the
    /// clone shares the connection pool held here.
    fn client_handle(&mut self) -> Result<Client, reqwest::Error> {
        if let Some(client) = self.client.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .connect_timeout(self.config.open_timeout)
            .timeout(self.config.read_timeout)
            .build()?;
        self.client = Some(client.clone());
        Ok(client)
    }

    /// Forces lazy re-creation on the next call after a transport failure
    /// left the connection in an unknown state.
    fn reset_client(&mut self) {
        self.client = None;
    }

    fn record_metric(
        &mut self,
        method: HttpMethod,
        path: String,
        status: Option<u16>,
        latency_ms: Option<f64>,
        error: Option<TransportKind>,
    ) {
        self.metrics.push(MetricRecord {
            method,
            path,
            status,
            latency_ms,
            error,
            screen: self.current_screen.clone(),
            time: wall_clock_seconds(),
        });
    }
}

enum BodyKind {
    Raw(String),
    Json(Value),
}

/// Borrowing request builder returned by the context's method helpers.
/// `send` is total: transport failures come back as a `Response`, never as
/// an error branch.
pub struct RequestSpec<'ctx> {
    ctx: &'ctx mut Context,
    method: HttpMethod,
    path: String,
    params: Vec<(String, String)>,
    headers: BTreeMap<String, String>,
    body: Option<BodyKind>,
    name: Option<String>,
}

impl RequestSpec<'_> {
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// JSON body; takes precedence over `body`. A `Value::String` is sent
    /// verbatim rather than re-encoded.
    #[must_use]
    pub fn json(mut self, value: impl Into<Value>) -> Self {
        self.body = Some(BodyKind::Json(value.into()));
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        if !matches!(self.body, Some(BodyKind::Json(_))) {
            self.body = Some(BodyKind::Raw(body.into()));
        }
        self
    }

    /// Metric label overriding the path, for templated paths that would
    /// otherwise explode the endpoint table.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub async fn send(self) -> Response {
        let metric_path = self.name.unwrap_or_else(|| self.path.clone());

        let url = match self.ctx.config.base_url.join(&self.path) {
            Ok(url) => url,
            Err(err) => {
                debug!("Failed to join '{}' onto base URL: {}", self.path, err);
                self.ctx.record_metric(
                    self.method,
                    metric_path,
                    None,
                    None,
                    Some(TransportKind::InvalidUrl),
                );
                return Response::transport(TransportKind::InvalidUrl);
            }
        };

        let client = match self.ctx.client_handle() {
            Ok(client) => client,
            Err(err) => {
                debug!("Failed to build HTTP client: {}", err);
                self.ctx.record_metric(
                    self.method,
                    metric_path,
                    None,
                    None,
                    Some(TransportKind::Client),
                );
                return Response::transport(TransportKind::Client);
            }
        };

        let mut request = client.request(self.method.as_reqwest(), url);
        if !self.params.is_empty() {
            request = request.query(&self.params);
        }

        let mut merged = self.ctx.default_headers.clone();
        merged.extend(self.headers);
        for (name, value) in &merged {
            request = request.header(name, value);
        }

        match self.body {
            Some(BodyKind::Json(Value::String(raw))) => request = request.body(raw),
            Some(BodyKind::Json(value)) => request = request.body(value.to_string()),
            Some(BodyKind::Raw(raw)) => request = request.body(raw),
            None => {}
        }

        let start = Instant::now();
        let outcome = match request.send().await {
            Ok(reply) => {
                let status = reply.status().as_u16();
                reply.bytes().await.map(|body| (status, body.to_vec()))
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok((status, body)) => {
                let latency_ms = round_tenth(start.elapsed().as_secs_f64() * 1000.0);
                self.ctx.record_metric(
                    self.method,
                    metric_path,
                    Some(status),
                    Some(latency_ms),
                    None,
                );
                Response::http(status, body)
            }
            Err(err) => {
                let latency_ms = round_tenth(start.elapsed().as_secs_f64() * 1000.0);
                let kind = classify_transport(&err);
                debug!("{} {} failed: {} ({})", self.method.as_str(), metric_path, err, kind.as_str());
                self.ctx.reset_client();
                self.ctx.record_metric(
                    self.method,
                    metric_path,
                    None,
                    Some(latency_ms),
                    Some(kind),
                );
                Response::transport(kind)
            }
        }
    }
}

fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn classify_transport(err: &reqwest::Error) -> TransportKind {
    if err.is_timeout() {
        if err.is_connect() {
            return TransportKind::OpenTimeout;
        }
        return TransportKind::ReadTimeout;
    }
    if let Some(kind) = source_io_kind(err) {
        return match kind {
            std::io::ErrorKind::ConnectionRefused => TransportKind::ConnectionRefused,
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe => TransportKind::ConnectionReset,
            std::io::ErrorKind::UnexpectedEof => TransportKind::UnexpectedEof,
            _ => TransportKind::Socket,
        };
    }
    if err.is_connect() {
        return TransportKind::ConnectionRefused;
    }
    if err.is_body() || err.is_decode() {
        return TransportKind::UnexpectedEof;
    }
    TransportKind::Socket
}

/// Walks the source chain for the underlying socket error, which reqwest
/// wraps at least twice (hyper, then its own error type).
fn source_io_kind(err: &reqwest::Error) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
            return Some(io_err.kind());
        }
        source = cause.source();
    }
    None
}
