use crate::core::io::report::ConvergenceRow;
use crate::core::observable::{MergedSeries, Observable};
use crate::core::stats::BlockStatistics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeasurementState {
    #[default]
    AwaitingRun,
    Running,
    Analyzing,
    Converged,
    Exhausted,
}

impl MeasurementState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Converged | Self::Exhausted)
    }
}

/// Why a measurement stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum Termination {
    /// Every precision target was met.
    Converged,
    /// The run count or wall-time budget ran out first.
    #[serde(rename_all = "kebab-case")]
    BudgetExhausted {
        runs: usize,
        elapsed_secs: f64,
        last_error: Option<String>,
    },
    /// Too many consecutive engine failures.
    #[serde(rename_all = "kebab-case")]
    Aborted {
        consecutive_failures: usize,
        last_error: String,
    },
}

impl Termination {
    pub fn state(&self) -> MeasurementState {
        match self {
            Self::Converged => MeasurementState::Converged,
            _ => MeasurementState::Exhausted,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Converged => "converged".to_string(),
            Self::BudgetExhausted {
                runs, elapsed_secs, ..
            } => format!("budget exhausted after {} run(s), {:.1}s", runs, elapsed_secs),
            Self::Aborted {
                consecutive_failures,
                last_error,
            } => format!(
                "aborted after {} consecutive failure(s): {}",
                consecutive_failures, last_error
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum RunOutcome {
    /// The engine ran; observables that could not be parsed from its output
    /// are listed with the reason and contributed no samples.
    #[serde(rename_all = "kebab-case")]
    Completed {
        samples: BTreeMap<Observable, usize>,
        parse_errors: BTreeMap<Observable, String>,
    },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub index: usize,
    pub dir: PathBuf,
    pub resumed_from: Option<usize>,
    pub elapsed_secs: f64,
    pub outcome: RunOutcome,
}

impl RunRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            RunOutcome::Failed { error } => Some(error),
            RunOutcome::Completed { .. } => None,
        }
    }
}

/// A run whose index has been reserved but whose outcome is not yet recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InFlightRun {
    pub index: usize,
    pub dir: PathBuf,
    pub resumed_from: Option<usize>,
}

/// Statistics of one observable as they stood after a given run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub run: usize,
    pub mean: Option<f64>,
    pub stderr: Option<f64>,
    pub equilibration_index: usize,
    pub samples: usize,
}

impl HistoryPoint {
    pub fn new(run: usize, stats: &BlockStatistics) -> Self {
        Self {
            run,
            mean: stats.mean.is_finite().then_some(stats.mean),
            stderr: stats.stderr.is_finite().then_some(stats.stderr),
            equilibration_index: stats.equilibration_index,
            samples: stats.samples,
        }
    }

    pub fn to_row(&self) -> ConvergenceRow {
        ConvergenceRow {
            run: self.run,
            mean: self.mean.unwrap_or(f64::NAN),
            stderr: self.stderr.unwrap_or(f64::NAN),
            equilibration_index: self.equilibration_index,
            samples: self.samples,
        }
    }
}

/// Persisted state of one measurement (`measurement.json`).
///
/// The ledger is the only source of truth for run numbering; run directories
/// are never scanned to infer progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub next_index: usize,
    pub state: MeasurementState,
    pub runs: Vec<RunRecord>,
    pub in_flight: Option<InFlightRun>,
    pub series: BTreeMap<Observable, MergedSeries>,
    pub history: BTreeMap<Observable, Vec<HistoryPoint>>,
    pub elapsed_secs: f64,
    pub consecutive_failures: usize,
    pub termination: Option<Termination>,
}

impl Ledger {
    pub fn new(observables: &[Observable]) -> Self {
        Self {
            next_index: 1,
            state: MeasurementState::AwaitingRun,
            runs: Vec::new(),
            in_flight: None,
            series: observables
                .iter()
                .map(|o| (o.clone(), MergedSeries::new()))
                .collect(),
            history: observables.iter().map(|o| (o.clone(), Vec::new())).collect(),
            elapsed_secs: 0.0,
            consecutive_failures: 0,
            termination: None,
        }
    }

    pub fn last_successful_run(&self) -> Option<&RunRecord> {
        self.runs.iter().rev().find(|r| r.succeeded())
    }

    pub fn last_error(&self) -> Option<String> {
        self.runs
            .iter()
            .rev()
            .find_map(|r| r.error().map(str::to_string))
    }
}
