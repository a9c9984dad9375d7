use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::config::{Configuration, MIN_SPAWN_RATE};
use crate::executor::Executor;
use crate::http::Context;
use crate::registry::Registry;
use crate::scenario::Step;
use crate::shutdown::ShutdownSender;
use crate::stats::Stats;

/// Poll cadence once the pool has reached its target.
const STEADY_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long termination waits for each user task before moving on.
const USER_JOIN_BUDGET: Duration = Duration::from_secs(2);

/// Everything a scaler or user task needs, cloned into each spawn.
#[derive(Clone)]
pub(super) struct ScalerContext {
    pub(super) registry: Arc<Registry>,
    pub(super) config: Arc<Configuration>,
    pub(super) steps: Arc<Vec<Step>>,
    pub(super) stats: Arc<Stats>,
    pub(super) stop: Arc<AtomicBool>,
    pub(super) shutdown_tx: ShutdownSender,
    pub(super) target_pool: Arc<AtomicUsize>,
    pub(super) spawn_rate_bits: Arc<AtomicU64>,
    pub(super) active: Arc<AtomicUsize>,
    pub(super) user_seq: Arc<AtomicU64>,
}

/// Launches user tasks at the configured cadence while the active pool is
/// below target, then polls. Reshape is observed every iteration; scale-down
/// happens inside the user tasks themselves.
pub(super) fn spawn_scaler(scaler: ScalerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut shutdown_rx = scaler.shutdown_tx.subscribe();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if scaler.stop.load(Ordering::Relaxed) {
                break;
            }
            let target = scaler.target_pool.load(Ordering::Relaxed);
            let active = scaler.active.load(Ordering::Relaxed);

            if active < target {
                let rate =
                    f64::from_bits(scaler.spawn_rate_bits.load(Ordering::Relaxed)).max(MIN_SPAWN_RATE);
                let cadence = Duration::from_secs_f64(1.0 / rate);
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    () = sleep(cadence) => {}
                }
                if scaler.stop.load(Ordering::Relaxed) {
                    break;
                }
                scaler.active.fetch_add(1, Ordering::Relaxed);
                handles.push(spawn_user(scaler.clone()));
                handles.retain(|handle| !handle.is_finished());
            } else {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    () = sleep(STEADY_POLL_INTERVAL) => {}
                }
            }
        }

        for handle in handles {
            match timeout(USER_JOIN_BUDGET, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("user task failed: {}", err),
                Err(_) => warn!("user task outlived the join budget; detaching"),
            }
        }
    })
}

/// Decrements the active count even when a screen panics through the task.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// One virtual-user task: iterate whole scenario sessions until stopped or
/// retired by a shrink.
fn spawn_user(scaler: ScalerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _guard = ActiveGuard(Arc::clone(&scaler.active));
        let mut executor = Executor::new(Arc::clone(&scaler.registry))
            .with_stop(Arc::clone(&scaler.stop))
            .with_shutdown(scaler.shutdown_tx.subscribe());

        loop {
            if scaler.stop.load(Ordering::Relaxed) {
                break;
            }
            if scaler.active.load(Ordering::Relaxed) > scaler.target_pool.load(Ordering::Relaxed) {
                debug!("active pool above target; retiring user task");
                break;
            }

            let user_id = scaler.user_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let mut ctx = Context::new(user_id, Arc::clone(&scaler.config));
            scaler.stats.user_started();

            if let Some(hook) = scaler.registry.on_start()
                && let Err(err) = hook(&mut ctx).await
            {
                ctx.record_scenario_error(None, format!("on_start hook: {}", err));
            }

            executor.execute(&scaler.steps, &mut ctx).await;

            if let Some(hook) = scaler.registry.on_stop()
                && let Err(err) = hook(&mut ctx).await
            {
                ctx.record_scenario_error(None, format!("on_stop hook: {}", err));
            }

            ctx.close();
            scaler.stats.record_user(&mut ctx);
            scaler.stats.user_finished();
        }
    })
}
