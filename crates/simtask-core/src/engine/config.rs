use crate::core::control::{BinGrid, ControlError, InputDeck, ParameterName};
use crate::core::observable::Observable;
use crate::core::stats::StatisticsConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Control template error: {0}")]
    Control(#[from] ControlError),

    #[error("At least one observable must be tracked")]
    NoObservables,

    #[error("Precision target given for untracked observable '{0}'")]
    UntrackedPrecision(Observable),

    #[error("Precision target for '{observable}' must be a positive number, got {value}")]
    InvalidPrecision { observable: Observable, value: f64 },

    #[error("Run budget must allow at least one run")]
    ZeroRunBudget,

    #[error("Consecutive failure threshold must be at least one")]
    ZeroFailureThreshold,

    #[error("A wall-time budget is required for {0}")]
    MissingTimeBudget(&'static str),

    #[error("Window {window} uses bins {found:?}, inconsistent with the shared grid {expected:?}")]
    InconsistentBins {
        window: String,
        expected: BinGrid,
        found: BinGrid,
    },

    #[error("Invalid window partition: {0}")]
    InvalidPartition(String),

    #[error("Invalid adaptive sweep: {0}")]
    InvalidRefinement(String),

    #[error("Sweep has no parameter values")]
    EmptySweep,

    #[error("Sweep value '{0}' appears more than once")]
    DuplicateValue(String),

    #[error("Sweep over '{expected}' was given a value for '{found}'")]
    ParameterMismatch {
        expected: ParameterName,
        found: ParameterName,
    },
}

/// Limits on how much simulation a measurement may consume.
///
/// `max_time` bounds accumulated wall time across runs and is checked only
/// between runs; an in-flight run is never interrupted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Budget {
    pub max_runs: usize,
    pub max_time: Option<Duration>,
}

impl Budget {
    pub fn allows_another_run(&self, runs: usize, elapsed: Duration) -> bool {
        runs < self.max_runs && self.max_time.is_none_or(|limit| elapsed < limit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementConfig {
    pub observables: Vec<Observable>,
    pub precisions: BTreeMap<Observable, f64>,
    pub budget: Budget,
    pub max_consecutive_failures: usize,
    pub statistics: StatisticsConfig,
    pub input: InputDeck,
}

impl MeasurementConfig {
    /// Same settings applied to a different input deck.
    pub fn with_input(&self, input: InputDeck) -> Self {
        Self {
            input,
            ..self.clone()
        }
    }

    pub fn with_budget(&self, budget: Budget) -> Self {
        Self {
            budget,
            ..self.clone()
        }
    }
}

#[derive(Default)]
pub struct MeasurementConfigBuilder {
    observables: Vec<Observable>,
    precisions: BTreeMap<Observable, f64>,
    max_runs: Option<usize>,
    max_time: Option<Duration>,
    max_consecutive_failures: Option<usize>,
    statistics: Option<StatisticsConfig>,
    input: Option<InputDeck>,
}

impl MeasurementConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observable(mut self, observable: Observable) -> Self {
        if !self.observables.contains(&observable) {
            self.observables.push(observable);
        }
        self
    }
    pub fn observables(mut self, observables: impl IntoIterator<Item = Observable>) -> Self {
        for observable in observables {
            self = self.observable(observable);
        }
        self
    }
    pub fn precision(mut self, observable: Observable, max_stderr: f64) -> Self {
        self.precisions.insert(observable, max_stderr);
        self
    }
    pub fn max_runs(mut self, runs: usize) -> Self {
        self.max_runs = Some(runs);
        self
    }
    pub fn max_time(mut self, limit: Duration) -> Self {
        self.max_time = Some(limit);
        self
    }
    pub fn max_consecutive_failures(mut self, n: usize) -> Self {
        self.max_consecutive_failures = Some(n);
        self
    }
    pub fn statistics(mut self, statistics: StatisticsConfig) -> Self {
        self.statistics = Some(statistics);
        self
    }
    pub fn input(mut self, input: InputDeck) -> Self {
        self.input = Some(input);
        self
    }

    pub fn build(self) -> Result<MeasurementConfig, ConfigError> {
        if self.observables.is_empty() {
            return Err(ConfigError::NoObservables);
        }
        for (observable, &value) in &self.precisions {
            if !self.observables.contains(observable) {
                return Err(ConfigError::UntrackedPrecision(observable.clone()));
            }
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidPrecision {
                    observable: observable.clone(),
                    value,
                });
            }
        }

        let max_runs = self
            .max_runs
            .ok_or(ConfigError::MissingParameter("max_runs"))?;
        if max_runs == 0 {
            return Err(ConfigError::ZeroRunBudget);
        }
        let max_consecutive_failures = self
            .max_consecutive_failures
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES);
        if max_consecutive_failures == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }

        Ok(MeasurementConfig {
            observables: self.observables,
            precisions: self.precisions,
            budget: Budget {
                max_runs,
                max_time: self.max_time,
            },
            max_consecutive_failures,
            statistics: self.statistics.unwrap_or_default(),
            input: self.input.ok_or(ConfigError::MissingParameter("input"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::tests::template;

    fn deck() -> InputDeck {
        InputDeck::new(template(), Vec::new())
    }

    fn energy() -> Observable {
        Observable::new("energy")
    }

    #[test]
    fn builder_succeeds_with_defaults() {
        let config = MeasurementConfigBuilder::new()
            .observable(energy())
            .precision(energy(), 0.5)
            .max_runs(10)
            .input(deck())
            .build()
            .unwrap();
        assert_eq!(config.max_consecutive_failures, DEFAULT_MAX_CONSECUTIVE_FAILURES);
        assert_eq!(config.budget.max_time, None);
        assert_eq!(config.statistics, StatisticsConfig::default());
    }

    #[test]
    fn builder_fails_on_missing_parameters() {
        let result = MeasurementConfigBuilder::new()
            .observable(energy())
            .input(deck())
            .build();
        assert!(matches!(result, Err(ConfigError::MissingParameter("max_runs"))));

        let result = MeasurementConfigBuilder::new()
            .observable(energy())
            .max_runs(1)
            .build();
        assert!(matches!(result, Err(ConfigError::MissingParameter("input"))));
    }

    #[test]
    fn precision_targets_must_refer_to_tracked_observables() {
        let result = MeasurementConfigBuilder::new()
            .observable(energy())
            .precision(Observable::indexed("nmol", [0]), 1.0)
            .max_runs(1)
            .input(deck())
            .build();
        assert!(matches!(result, Err(ConfigError::UntrackedPrecision(_))));
    }

    #[test]
    fn invalid_budgets_and_targets_are_rejected() {
        let base = || {
            MeasurementConfigBuilder::new()
                .observable(energy())
                .input(deck())
        };
        assert!(matches!(
            base().max_runs(0).build(),
            Err(ConfigError::ZeroRunBudget)
        ));
        assert!(matches!(
            base().max_runs(1).precision(energy(), 0.0).build(),
            Err(ConfigError::InvalidPrecision { .. })
        ));
        assert!(matches!(
            base().max_runs(1).max_consecutive_failures(0).build(),
            Err(ConfigError::ZeroFailureThreshold)
        ));
        assert!(matches!(
            MeasurementConfigBuilder::new().max_runs(1).input(deck()).build(),
            Err(ConfigError::NoObservables)
        ));
    }

    #[test]
    fn budget_checks_runs_and_elapsed_time() {
        let budget = Budget {
            max_runs: 3,
            max_time: Some(Duration::from_secs(10)),
        };
        assert!(budget.allows_another_run(2, Duration::from_secs(9)));
        assert!(!budget.allows_another_run(3, Duration::ZERO));
        assert!(!budget.allows_another_run(1, Duration::from_secs(10)));

        let zero_time = Budget {
            max_runs: 5,
            max_time: Some(Duration::ZERO),
        };
        assert!(!zero_time.allows_another_run(1, Duration::ZERO));
    }
}
