use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::debug;

use crate::http::Context;
use crate::registry::Registry;
use crate::scenario::{ChooseOption, OptionBody, Step};
use crate::shutdown::ShutdownReceiver;

type StepFuture<'walk> = Pin<Box<dyn Future<Output = ()> + Send + 'walk>>;

/// Walks a step-tree against one user's context.
///
/// The executor is non-fatal by construction: missing symbols and screen
/// failures become scenario errors on the context, and only the abort flag
/// or the run-wide stop flag end the walk early. It never touches the
/// aggregator and never terminates the run.
pub struct Executor {
    registry: Arc<Registry>,
    rng: StdRng,
    stop: Arc<AtomicBool>,
    shutdown: Option<ShutdownReceiver>,
}

impl Executor {
    #[must_use]
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            rng: StdRng::from_entropy(),
            stop: Arc::new(AtomicBool::new(false)),
            shutdown: None,
        }
    }

    /// Deterministic executor for reproducing a single user's walk.
    #[must_use]
    pub fn seeded(registry: Arc<Registry>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(registry)
        }
    }

    #[must_use]
    pub fn with_stop(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// Shutdown receiver used to cut think-time sleeps short.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: ShutdownReceiver) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn execute<'walk>(
        &'walk mut self,
        steps: &'walk [Step],
        ctx: &'walk mut Context,
    ) -> StepFuture<'walk> {
        Box::pin(async move {
            for step in steps {
                if ctx.aborted() || self.stop.load(Ordering::Relaxed) {
                    break;
                }
                match step {
                    Step::Visit { screen } => self.visit(screen, ctx).await,
                    Step::Think { lo, hi } => self.think(*lo, *hi).await,
                    Step::Choose {
                        options,
                        total_weight,
                    } => self.choose(options, *total_weight, ctx).await,
                }
            }
        })
    }

    async fn visit(&mut self, screen: &str, ctx: &mut Context) {
        let Some(callable) = self.registry.screen(screen) else {
            ctx.record_scenario_error(Some(screen), format!("undefined screen '{}'", screen));
            return;
        };
        ctx.set_current_screen(screen);
        if let Err(err) = callable(ctx).await {
            ctx.record_scenario_error(Some(screen), format!("{}: {}", screen, err));
        }
    }

    async fn think(&mut self, lo: f64, hi: f64) {
        let base = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        let jitter: f64 = self.rng.r#gen();
        let pause = Duration::from_secs_f64(base + jitter);

        match self.shutdown.as_mut() {
            Some(shutdown) => {
                tokio::select! {
                    _ = shutdown.recv() => {}
                    () = sleep(pause) => {}
                }
            }
            None => sleep(pause).await,
        }
    }

    async fn choose(&mut self, options: &[ChooseOption], total_weight: u32, ctx: &mut Context) {
        let Some(option) = self.draw(options, total_weight) else {
            return;
        };
        match &option.body {
            OptionBody::Inline(steps) => {
                self.execute(steps, ctx).await;
            }
            OptionBody::ScenarioRef(name) => match self.registry.scenario(name) {
                Some(steps) => {
                    self.execute(&steps, ctx).await;
                }
                None => {
                    debug!("choose referenced unknown scenario '{}'", name);
                    ctx.record_scenario_error(None, format!("undefined scenario '{}'", name));
                }
            },
        }
    }

    /// Weighted draw: `r` in `[1, total]`, first option whose cumulative
    /// weight reaches `r`. A zero-weight option can never cross `r`.
    fn draw<'opts>(
        &mut self,
        options: &'opts [ChooseOption],
        total_weight: u32,
    ) -> Option<&'opts ChooseOption> {
        if total_weight == 0 {
            return None;
        }
        let roll = self.rng.gen_range(1..=total_weight);
        let mut cumulative = 0u32;
        for option in options {
            cumulative = cumulative.saturating_add(option.weight);
            if cumulative >= roll {
                return Some(option);
            }
        }
        options.last()
    }
}
