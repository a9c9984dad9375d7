//! Run lifecycle: the virtual-user pool, spawn cadence, reshape, and
//! termination.

mod monitor;
mod scaler;
mod summary;

pub use summary::{print_summary, summary_lines};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tracing::info;

use crate::config::{Configuration, MIN_SPAWN_RATE};
use crate::error::AppResult;
use crate::registry::Registry;
use crate::scenario::Step;
use crate::shutdown::{ShutdownSender, setup_signal_shutdown_handler, shutdown_channel};
use crate::stats::{Snapshot, Stats, Summary};

/// Poll interval for the stop flag and the duration deadline.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Snapshot cadence for the live monitor and dashboard streams.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Stopping,
    Complete,
}

impl RunState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Stopping,
            3 => RunState::Complete,
            _ => RunState::Idle,
        }
    }

    const fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Stopping => 2,
            RunState::Complete => 3,
        }
    }
}

/// Owns one load run: the user pool, its scaler, the stats aggregator, and
/// the snapshot fan-out. Constructed only after the registry validates.
pub struct Runner {
    registry: Arc<Registry>,
    config: Arc<Configuration>,
    scenario: String,
    steps: Arc<Vec<Step>>,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
    shutdown_tx: ShutdownSender,
    target_pool: Arc<AtomicUsize>,
    spawn_rate_bits: Arc<AtomicU64>,
    active: Arc<AtomicUsize>,
    user_seq: Arc<AtomicU64>,
    state: Arc<AtomicU8>,
    snapshot_tx: watch::Sender<Snapshot>,
    live_monitor: bool,
    no_color: bool,
}

impl Runner {
    /// Builds a runner for the named scenario with the registry's own
    /// configuration.
    ///
    /// # Errors
    ///
    /// Configuration constraints and registry reachability are both checked
    /// here, before any user can be spawned.
    pub fn new(registry: Arc<Registry>, scenario: &str) -> AppResult<Self> {
        let config = registry.config().clone();
        Self::with_config(registry, scenario, config)
    }

    /// Same as `new` with an overridden configuration (dashboard start
    /// requests patch users/spawn_rate/workers).
    ///
    /// # Errors
    ///
    /// See `new`.
    pub fn with_config(
        registry: Arc<Registry>,
        scenario: &str,
        config: Configuration,
    ) -> AppResult<Self> {
        config.validate()?;
        registry.validate(scenario)?;
        let steps = registry
            .scenario(scenario)
            .unwrap_or_else(|| Arc::new(Vec::new()));

        let (snapshot_tx, _) = watch::channel(Snapshot::idle());
        Ok(Self {
            registry,
            target_pool: Arc::new(AtomicUsize::new(config.users)),
            spawn_rate_bits: Arc::new(AtomicU64::new(config.spawn_rate.to_bits())),
            config: Arc::new(config),
            scenario: scenario.to_owned(),
            steps,
            stats: Arc::new(Stats::new()),
            stop: Arc::new(AtomicBool::new(false)),
            shutdown_tx: shutdown_channel().0,
            active: Arc::new(AtomicUsize::new(0)),
            user_seq: Arc::new(AtomicU64::new(0)),
            state: Arc::new(AtomicU8::new(RunState::Idle.as_u8())),
            snapshot_tx,
            live_monitor: false,
            no_color: false,
        })
    }

    /// Enables the terminal status line (terminal runs only).
    #[must_use]
    pub fn with_live_monitor(mut self, no_color: bool) -> Self {
        self.live_monitor = true;
        self.no_color = no_color;
        self
    }

    #[must_use]
    pub fn scenario_name(&self) -> &str {
        &self.scenario
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    #[must_use]
    pub fn active_users(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Live snapshot feed; every subscriber sees the same interval stream.
    #[must_use]
    pub fn subscribe_snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Reshape: retarget the active pool mid-run. Scale-down is passive;
    /// users retire at their next session boundary.
    pub fn update_pool(&self, users: usize) {
        if users >= 1 {
            self.target_pool.store(users, Ordering::Relaxed);
            info!("pool retargeted to {} users", users);
        }
    }

    /// Reshape: change the spawn cadence mid-run.
    pub fn update_spawn_rate(&self, rate: f64) {
        if rate >= MIN_SPAWN_RATE {
            self.spawn_rate_bits.store(rate.to_bits(), Ordering::Relaxed);
            info!("spawn rate retargeted to {} users/s", rate);
        }
    }

    /// External stop command (dashboard or embedder).
    pub fn signal_stop(&self) {
        if self.state() == RunState::Running {
            self.set_state(RunState::Stopping);
        }
        self.stop.store(true, Ordering::Relaxed);
        drop(self.shutdown_tx.send(()));
    }

    /// Drives the run to completion: scale-up, steady state, termination.
    /// Returns the final aggregate; the caller decides how to present it.
    pub async fn run(&self) -> Summary {
        self.set_state(RunState::Running);
        let start = Instant::now();
        info!(
            "starting scenario '{}': {} users at {}/s against {}",
            self.scenario, self.config.users, self.config.spawn_rate, self.config.base_url
        );

        let signal_handle = setup_signal_shutdown_handler(&self.shutdown_tx);
        let ticker_handle = self.spawn_snapshot_ticker(start);
        let monitor_handle = if self.live_monitor {
            monitor::setup_live_monitor(
                self.snapshot_tx.subscribe(),
                &self.shutdown_tx,
                self.no_color,
            )
        } else {
            tokio::spawn(async {})
        };
        let scaler_handle = scaler::spawn_scaler(self.scaler_context());

        let deadline = self.config.duration.map(|duration| start + duration);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            if let Some(deadline) = deadline
                && Instant::now() >= deadline
            {
                info!("run duration elapsed");
                break;
            }
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                () = sleep(STOP_POLL_INTERVAL) => {}
            }
        }

        self.set_state(RunState::Stopping);
        self.stop.store(true, Ordering::Relaxed);
        drop(self.shutdown_tx.send(()));

        let (_, _, _, scaler_result) = tokio::join!(
            signal_handle,
            ticker_handle,
            monitor_handle,
            scaler_handle
        );
        if let Err(err) = scaler_result {
            tracing::warn!("scaler task failed: {}", err);
        }

        self.stats.finalize(start.elapsed());
        self.set_state(RunState::Complete);
        let summary = self.stats.summary();
        self.snapshot_tx.send_replace(self.stats.snapshot(
            RunState::Complete,
            start.elapsed(),
            0,
        ));
        summary
    }

    fn scaler_context(&self) -> scaler::ScalerContext {
        scaler::ScalerContext {
            registry: Arc::clone(&self.registry),
            config: Arc::clone(&self.config),
            steps: Arc::clone(&self.steps),
            stats: Arc::clone(&self.stats),
            stop: Arc::clone(&self.stop),
            shutdown_tx: self.shutdown_tx.clone(),
            target_pool: Arc::clone(&self.target_pool),
            spawn_rate_bits: Arc::clone(&self.spawn_rate_bits),
            active: Arc::clone(&self.active),
            user_seq: Arc::clone(&self.user_seq),
        }
    }

    fn spawn_snapshot_ticker(&self, start: Instant) -> tokio::task::JoinHandle<()> {
        let stats = Arc::clone(&self.stats);
        let active = Arc::clone(&self.active);
        let state = Arc::clone(&self.state);
        let snapshot_tx = self.snapshot_tx.clone();
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let mut shutdown_rx = shutdown_tx.subscribe();
            let mut ticker = interval(SNAPSHOT_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => {
                        let snapshot = stats.snapshot(
                            RunState::from_u8(state.load(Ordering::Relaxed)),
                            start.elapsed(),
                            active.load(Ordering::Relaxed),
                        );
                        snapshot_tx.send_replace(snapshot);
                    }
                }
            }
        })
    }
}
