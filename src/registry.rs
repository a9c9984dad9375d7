use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Configuration;
use crate::error::{ScenarioBuildError, ValidationError};
use crate::http::{Context, ScreenResult};
use crate::scenario::{OptionBody, ScenarioBuilder, Step};

pub type ScreenFuture<'ctx> = Pin<Box<dyn Future<Output = ScreenResult> + Send + 'ctx>>;

/// A named callable driving one logical UI page against a user's context.
/// Opaque to the executor; hooks share the same shape.
pub type ScreenFn = Arc<dyn for<'ctx> Fn(&'ctx mut Context) -> ScreenFuture<'ctx> + Send + Sync>;

/// The run specification: configuration, screens, scenarios, and lifecycle
/// hooks. Built by the embedder, frozen into an `Arc` when a runner is
/// constructed.
#[derive(Default)]
pub struct Registry {
    config: Configuration,
    screens: HashMap<String, ScreenFn>,
    scenarios: HashMap<String, Arc<Vec<Step>>>,
    on_start: Option<ScreenFn>,
    on_stop: Option<ScreenFn>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("screens", &self.screens.keys().collect::<BTreeSet<_>>())
            .field("scenarios", &self.scenarios.keys().collect::<BTreeSet<_>>())
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

impl Registry {
    #[must_use]
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    pub fn add_screen<F>(&mut self, name: impl Into<String>, screen: F)
    where
        F: for<'ctx> Fn(&'ctx mut Context) -> ScreenFuture<'ctx> + Send + Sync + 'static,
    {
        self.screens.insert(name.into(), Arc::new(screen));
    }

    /// Registers a scenario built through the step DSL.
    ///
    /// # Errors
    ///
    /// Returns the builder's deferred input-validation error; nothing is
    /// registered in that case.
    pub fn add_scenario(
        &mut self,
        name: impl Into<String>,
        configure: impl FnOnce(&mut ScenarioBuilder),
    ) -> Result<(), ScenarioBuildError> {
        let mut builder = ScenarioBuilder::new();
        configure(&mut builder);
        let steps = builder.build()?;
        self.scenarios.insert(name.into(), Arc::new(steps));
        Ok(())
    }

    /// Registers an already-built step sequence.
    pub fn add_scenario_steps(&mut self, name: impl Into<String>, steps: Vec<Step>) {
        self.scenarios.insert(name.into(), Arc::new(steps));
    }

    pub fn set_on_start<F>(&mut self, hook: F)
    where
        F: for<'ctx> Fn(&'ctx mut Context) -> ScreenFuture<'ctx> + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(hook));
    }

    pub fn set_on_stop<F>(&mut self, hook: F)
    where
        F: for<'ctx> Fn(&'ctx mut Context) -> ScreenFuture<'ctx> + Send + Sync + 'static,
    {
        self.on_stop = Some(Arc::new(hook));
    }

    #[must_use]
    pub fn screen(&self, name: &str) -> Option<ScreenFn> {
        self.screens.get(name).cloned()
    }

    #[must_use]
    pub fn scenario(&self, name: &str) -> Option<Arc<Vec<Step>>> {
        self.scenarios.get(name).cloned()
    }

    #[must_use]
    pub fn on_start(&self) -> Option<ScreenFn> {
        self.on_start.clone()
    }

    #[must_use]
    pub fn on_stop(&self) -> Option<ScreenFn> {
        self.on_stop.clone()
    }

    /// Registered scenario names, sorted for stable status output.
    #[must_use]
    pub fn scenario_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.scenarios.keys().cloned().collect();
        names.sort();
        names
    }

    /// `main` when registered, else the first scenario by name.
    #[must_use]
    pub fn default_scenario(&self) -> Option<String> {
        if self.scenarios.contains_key("main") {
            return Some("main".to_owned());
        }
        self.scenario_names().into_iter().next()
    }

    /// Drops every registration and restores the default configuration.
    pub fn reset(&mut self) {
        self.config = Configuration::default();
        self.screens.clear();
        self.scenarios.clear();
        self.on_start = None;
        self.on_stop = None;
    }

    /// Pre-run reachability check: every `Visit` reachable from the named
    /// scenario (through `ScenarioRef`s, cycles included) must name a
    /// registered screen.
    ///
    /// # Errors
    ///
    /// `UnknownScenario` for a missing top-level name; `UnresolvedSymbols`
    /// listing every missing screen and sub-scenario otherwise.
    pub fn validate(&self, scenario: &str) -> Result<(), ValidationError> {
        let Some(steps) = self.scenarios.get(scenario) else {
            return Err(ValidationError::UnknownScenario {
                name: scenario.to_owned(),
            });
        };

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(scenario.to_owned());
        let mut missing_screens = BTreeSet::new();
        let mut missing_scenarios = BTreeSet::new();
        self.walk(steps, &mut visited, &mut missing_screens, &mut missing_scenarios);

        if missing_screens.is_empty() && missing_scenarios.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::UnresolvedSymbols {
                screens: missing_screens.into_iter().collect(),
                scenarios: missing_scenarios.into_iter().collect(),
            })
        }
    }

    fn walk(
        &self,
        steps: &[Step],
        visited: &mut HashSet<String>,
        missing_screens: &mut BTreeSet<String>,
        missing_scenarios: &mut BTreeSet<String>,
    ) {
        for step in steps {
            match step {
                Step::Visit { screen } => {
                    if !self.screens.contains_key(screen) {
                        missing_screens.insert(screen.clone());
                    }
                }
                Step::Think { .. } => {}
                Step::Choose { options, .. } => {
                    for option in options {
                        match &option.body {
                            OptionBody::Inline(inner) => {
                                self.walk(inner, visited, missing_screens, missing_scenarios);
                            }
                            OptionBody::ScenarioRef(name) => {
                                if visited.insert(name.clone()) {
                                    match self.scenarios.get(name) {
                                        Some(sub) => self.walk(
                                            sub,
                                            visited,
                                            missing_screens,
                                            missing_scenarios,
                                        ),
                                        None => {
                                            missing_scenarios.insert(name.clone());
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
