use std::ops::{Range, RangeInclusive};

use crate::error::ScenarioBuildError;

use super::{ChooseOption, OptionBody, Step};

/// Think-time input: a single numeric collapses to a degenerate range.
#[derive(Debug, Clone, Copy)]
pub struct ThinkTime {
    lo: f64,
    hi: f64,
}

impl From<f64> for ThinkTime {
    fn from(value: f64) -> Self {
        Self {
            lo: value,
            hi: value,
        }
    }
}

impl From<u64> for ThinkTime {
    fn from(value: u64) -> Self {
        let secs = value as f64;
        Self { lo: secs, hi: secs }
    }
}

impl From<(f64, f64)> for ThinkTime {
    fn from((lo, hi): (f64, f64)) -> Self {
        Self { lo, hi }
    }
}

impl From<Range<f64>> for ThinkTime {
    fn from(range: Range<f64>) -> Self {
        Self {
            lo: range.start,
            hi: range.end,
        }
    }
}

impl From<RangeInclusive<f64>> for ThinkTime {
    fn from(range: RangeInclusive<f64>) -> Self {
        Self {
            lo: *range.start(),
            hi: *range.end(),
        }
    }
}

impl ThinkTime {
    fn validate(self) -> Result<(f64, f64), ScenarioBuildError> {
        if self.lo < 0.0 || self.hi < 0.0 {
            return Err(ScenarioBuildError::NegativeThink {
                value: self.lo.min(self.hi),
            });
        }
        if self.lo > self.hi {
            return Err(ScenarioBuildError::ReversedThinkRange {
                lo: self.lo,
                hi: self.hi,
            });
        }
        Ok((self.lo, self.hi))
    }
}

/// Accumulates steps in insertion order; input errors are deferred to
/// `build()` so the DSL chains without per-call `?`.
#[derive(Debug, Default)]
pub struct ScenarioBuilder {
    steps: Vec<Step>,
    error: Option<ScenarioBuildError>,
}

impl ScenarioBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit(&mut self, screen: impl Into<String>) -> &mut Self {
        self.steps.push(Step::Visit {
            screen: screen.into(),
        });
        self
    }

    pub fn think(&mut self, time: impl Into<ThinkTime>) -> &mut Self {
        match time.into().validate() {
            Ok((lo, hi)) => self.steps.push(Step::Think { lo, hi }),
            Err(err) => self.record_error(err),
        }
        self
    }

    pub fn choose(&mut self, configure: impl FnOnce(&mut ChooseBuilder)) -> &mut Self {
        let mut chooser = ChooseBuilder::default();
        configure(&mut chooser);
        match chooser.finish() {
            Ok(step) => self.steps.push(step),
            Err(err) => self.record_error(err),
        }
        self
    }

    /// Freezes the accumulated tree.
    ///
    /// # Errors
    ///
    /// Returns the first input-validation error recorded by `think` or
    /// `choose`.
    pub fn build(self) -> Result<Vec<Step>, ScenarioBuildError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.steps),
        }
    }

    fn record_error(&mut self, err: ScenarioBuildError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Builder scoped to one `choose` block.
#[derive(Debug, Default)]
pub struct ChooseBuilder {
    options: Vec<ChooseOption>,
    error: Option<ScenarioBuildError>,
}

impl ChooseBuilder {
    /// Weighted option with an inline step sequence.
    pub fn percent(&mut self, weight: u32, configure: impl FnOnce(&mut ScenarioBuilder)) {
        let mut nested = ScenarioBuilder::new();
        configure(&mut nested);
        match nested.build() {
            Ok(steps) => self.options.push(ChooseOption {
                weight,
                body: OptionBody::Inline(steps),
            }),
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
    }

    /// Weighted option that resolves a named scenario at execution time.
    pub fn percent_scenario(&mut self, weight: u32, scenario: impl Into<String>) {
        self.options.push(ChooseOption {
            weight,
            body: OptionBody::ScenarioRef(scenario.into()),
        });
    }

    fn finish(self) -> Result<Step, ScenarioBuildError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.options.is_empty() {
            return Err(ScenarioBuildError::EmptyChoose);
        }
        let total_weight = self
            .options
            .iter()
            .fold(0u32, |sum, option| sum.saturating_add(option.weight));
        if total_weight == 0 {
            return Err(ScenarioBuildError::ZeroTotalWeight);
        }
        Ok(Step::Choose {
            options: self.options,
            total_weight,
        })
    }
}
