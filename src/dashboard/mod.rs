//! Browser control surface: status, start/stop commands, and a once-per-
//! second snapshot event-stream, served over a plain tokio accept loop.

mod http;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{ConfigView, Configuration};
use crate::error::{DashboardError, ValidationError};
use crate::registry::Registry;
use crate::runner::{RunState, Runner};
use crate::stats::Snapshot;

use http::{
    HttpRequest, read_http_request, write_error_response, write_html_response, write_json_response,
    write_sse_frame, write_sse_headers,
};

pub const DEFAULT_DASHBOARD_PORT: u16 = 8089;

/// Cadence of `GET /api/stream` frames.
const STREAM_INTERVAL: Duration = Duration::from_secs(1);

const DASHBOARD_PAGE: &str = include_str!("page.html");

#[derive(Debug, Default, Deserialize)]
struct StartRequest {
    scenario: Option<String>,
    users: Option<i64>,
    spawn_rate: Option<f64>,
    workers: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    state: RunState,
    scenario: String,
}

#[derive(Debug, Serialize)]
struct StopResponse {
    state: RunState,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    state: RunState,
    scenarios: Vec<String>,
    config: ConfigView,
}

struct DashboardState {
    registry: Arc<Registry>,
    current: Mutex<Option<Arc<Runner>>>,
}

impl DashboardState {
    fn current(&self) -> MutexGuard<'_, Option<Arc<Runner>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run_state(&self) -> RunState {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(RunState::Idle, |runner| runner.state())
    }
}

/// A bound dashboard server, not yet accepting. Splitting bind from the
/// accept loop lets tests pick an ephemeral port and read it back.
pub struct DashboardServer {
    listener: TcpListener,
    state: Arc<DashboardState>,
}

impl DashboardServer {
    /// # Errors
    ///
    /// Fails only when the port cannot be bound; a run already in progress
    /// is unaffected by that failure.
    pub async fn bind(registry: Arc<Registry>, port: u16) -> Result<Self, DashboardError> {
        let addr = format!("0.0.0.0:{}", port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| DashboardError::Bind { addr, source: err })?;
        Ok(Self {
            listener,
            state: Arc::new(DashboardState {
                registry,
                current: Mutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Accepts connections until the process ends.
    pub async fn run(self) {
        if let Some(addr) = self.local_addr() {
            info!("dashboard listening on http://{}", addr);
        }
        loop {
            let socket = match self.listener.accept().await {
                Ok((socket, _peer)) => socket,
                Err(err) => {
                    warn!("dashboard accept failed: {}", err);
                    continue;
                }
            };
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                if let Err(err) = handle_connection(socket, state).await {
                    debug!("dashboard connection ended: {}", err);
                }
            });
        }
    }
}

/// Binds and serves the dashboard until the process ends.
///
/// # Errors
///
/// See [`DashboardServer::bind`].
pub async fn serve(registry: Arc<Registry>, port: u16) -> Result<(), DashboardError> {
    DashboardServer::bind(registry, port).await?.run().await;
    Ok(())
}

async fn handle_connection(
    mut socket: TcpStream,
    state: Arc<DashboardState>,
) -> Result<(), DashboardError> {
    let request = match read_http_request(&mut socket).await {
        Ok(request) => request,
        Err(err) => {
            return write_error_response(&mut socket, err.status, &err.message).await;
        }
    };

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/") => write_html_response(&mut socket, DASHBOARD_PAGE).await,
        ("GET", "/api/status") => handle_status(&mut socket, &state).await,
        ("POST", "/api/start") => handle_start(&mut socket, &state, &request).await,
        ("POST", "/api/stop") => handle_stop(&mut socket, &state).await,
        ("GET", "/api/stream") => handle_stream(&mut socket, &state).await,
        _ => write_error_response(&mut socket, 404, "not found").await,
    }
}

async fn handle_status(
    socket: &mut TcpStream,
    state: &DashboardState,
) -> Result<(), DashboardError> {
    let config = state
        .current()
        .as_ref()
        .map_or_else(|| state.registry.config().clone(), |runner| runner.config().clone());
    let status = StatusResponse {
        state: state.run_state(),
        scenarios: state.registry.scenario_names(),
        config: config.public_view(),
    };
    write_json_response(socket, 200, &status).await
}

async fn handle_start(
    socket: &mut TcpStream,
    state: &DashboardState,
    request: &HttpRequest,
) -> Result<(), DashboardError> {
    let start: StartRequest = if request.body.is_empty() {
        StartRequest::default()
    } else {
        match serde_json::from_slice(&request.body) {
            Ok(start) => start,
            Err(err) => {
                return write_error_response(socket, 400, &format!("invalid start body: {}", err))
                    .await;
            }
        }
    };

    let Some(scenario) = start
        .scenario
        .clone()
        .or_else(|| state.registry.default_scenario())
    else {
        let err = ValidationError::NoScenarios;
        return write_error_response(socket, 400, &err.to_string()).await;
    };
    if state.registry.scenario(&scenario).is_none() {
        return write_error_response(socket, 400, &format!("unknown scenario '{}'", scenario))
            .await;
    }

    let config = patched_config(state.registry.config().clone(), &start);
    enum StartOutcome {
        Conflict,
        ConfigError(crate::error::AppError),
        Started(Arc<Runner>),
    }
    let outcome = {
        let mut current = state.current();
        // A stored runner that has not completed is committed even if its
        // task has not been scheduled yet (state still idle).
        if current
            .as_ref()
            .is_some_and(|runner| runner.state() != RunState::Complete)
        {
            StartOutcome::Conflict
        } else {
            match Runner::with_config(Arc::clone(&state.registry), &scenario, config) {
                Ok(runner) => {
                    let runner = Arc::new(runner);
                    *current = Some(Arc::clone(&runner));
                    StartOutcome::Started(runner)
                }
                Err(err) => StartOutcome::ConfigError(err),
            }
        }
    };
    let runner = match outcome {
        StartOutcome::Conflict => {
            return write_error_response(socket, 409, "a run is already in progress").await;
        }
        StartOutcome::ConfigError(err) => {
            return write_error_response(socket, 400, &err.to_string()).await;
        }
        StartOutcome::Started(runner) => runner,
    };

    info!("dashboard starting scenario '{}'", scenario);
    let run_handle = Arc::clone(&runner);
    tokio::spawn(async move {
        run_handle.run().await;
    });

    write_json_response(
        socket,
        200,
        &StartResponse {
            state: RunState::Running,
            scenario,
        },
    )
    .await
}

/// Numeric overrides are applied only when positive; everything else keeps
/// the registry's configuration.
fn patched_config(mut config: Configuration, start: &StartRequest) -> Configuration {
    if let Some(users) = start.users
        && users > 0
    {
        config.users = users as usize;
    }
    if let Some(rate) = start.spawn_rate
        && rate > 0.0
    {
        config.spawn_rate = rate;
    }
    if let Some(workers) = start.workers
        && workers > 0
    {
        config.workers = workers as usize;
    }
    config
}

async fn handle_stop(socket: &mut TcpStream, state: &DashboardState) -> Result<(), DashboardError> {
    let runner = state.current().clone();
    match runner {
        Some(runner) if matches!(runner.state(), RunState::Idle | RunState::Running) => {
            runner.signal_stop();
            write_json_response(
                socket,
                200,
                &StopResponse {
                    state: RunState::Stopping,
                },
            )
            .await
        }
        _ => write_error_response(socket, 409, "no run in progress").await,
    }
}

/// Open-ended event stream: one snapshot frame per second until the client
/// goes away. Frames come from the runner's shared snapshot feed, so stream
/// clients and the terminal monitor see the same interval windows.
async fn handle_stream(
    socket: &mut TcpStream,
    state: &DashboardState,
) -> Result<(), DashboardError> {
    write_sse_headers(socket).await?;
    loop {
        let snapshot = current_snapshot(state);
        let payload = serde_json::to_vec(&snapshot).map_err(|err| DashboardError::Serialize {
            context: "stream snapshot",
            source: err,
        })?;
        write_sse_frame(socket, &payload).await?;
        sleep(STREAM_INTERVAL).await;
    }
}

fn current_snapshot(state: &DashboardState) -> Snapshot {
    state
        .current()
        .as_ref()
        .map_or_else(Snapshot::idle, |runner| {
            runner.subscribe_snapshots().borrow().clone()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn positive_overrides_patch_the_config() {
        let base = Configuration::default();
        let start = StartRequest {
            scenario: None,
            users: Some(25),
            spawn_rate: Some(5.0),
            workers: Some(8),
        };
        let patched = patched_config(base, &start);
        assert_eq!(patched.users, 25);
        assert_eq!(patched.spawn_rate, 5.0);
        assert_eq!(patched.workers, 8);
    }

    #[test]
    fn non_positive_overrides_are_ignored() {
        let base = Configuration::default();
        let start = StartRequest {
            scenario: None,
            users: Some(0),
            spawn_rate: Some(-1.0),
            workers: Some(-3),
        };
        let patched = patched_config(base.clone(), &start);
        assert_eq!(patched.users, base.users);
        assert_eq!(patched.spawn_rate, base.spawn_rate);
        assert_eq!(patched.workers, base.workers);
    }

    #[test]
    fn serialized_value_shapes_are_stable() {
        let status = StatusResponse {
            state: RunState::Idle,
            scenarios: vec!["main".to_owned()],
            config: Configuration::default().public_view(),
        };
        let value: Value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "idle");
        assert_eq!(value["scenarios"][0], "main");
        assert!(value["config"]["base_url"].is_string());
    }
}
