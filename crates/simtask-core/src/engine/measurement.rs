use super::config::MeasurementConfig;
use super::context::RunContext;
use super::error::EngineError;
use super::interface::RunHandle;
use super::progress::Progress;
use super::state::{
    HistoryPoint, InFlightRun, Ledger, MeasurementState, RunOutcome, RunRecord, Termination,
};
use crate::core::io::report::{self, ConvergenceRow};
use crate::core::observable::Observable;
use crate::core::stats::BlockStatistics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

pub const LEDGER_FILE: &str = "measurement.json";
pub const REPORT_FILE: &str = "report.json";
const INTERRUPTED: &str = "run was interrupted before its outcome was recorded";

pub fn run_dir_name(index: usize) -> String {
    format!("sim_{}", index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableEstimate {
    pub mean: Option<f64>,
    pub stderr: Option<f64>,
    pub equilibration_index: usize,
    pub samples: usize,
    pub block_size: Option<usize>,
    pub target: Option<f64>,
    pub target_met: bool,
}

/// Final outcome of a measurement, frozen once it reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub state: MeasurementState,
    pub termination: Termination,
    pub runs: usize,
    pub successful_runs: usize,
    pub elapsed_secs: f64,
    /// Working directory of the most recent successful run, whose final state
    /// (configuration, accumulated matrices) is the measurement's end product.
    pub last_run_dir: Option<PathBuf>,
    pub estimates: BTreeMap<Observable, ObservableEstimate>,
    /// Observables lacking a usable mean or standard error.
    pub missing: Vec<Observable>,
}

impl MeasurementReport {
    pub fn mean(&self, observable: &Observable) -> Option<f64> {
        self.estimates.get(observable).and_then(|e| e.mean)
    }

    pub fn stderr(&self, observable: &Observable) -> Option<f64> {
        self.estimates.get(observable).and_then(|e| e.stderr)
    }
}

/// Repeated, resumed engine runs for one set of control parameters.
///
/// Each run `k > 1` resumes the most recent successful run, so the merged
/// sample series of every observable grows monotonically. After each run the
/// merged series are re-analysed and the measurement either stops (targets met,
/// budget spent, or too many consecutive failures) or schedules another run.
pub struct Measurement {
    config: MeasurementConfig,
    output_dir: PathBuf,
    ledger: Ledger,
    stats: BTreeMap<Observable, BlockStatistics>,
    report: Option<MeasurementReport>,
}

impl Measurement {
    /// Opens the measurement rooted at `output_dir`, continuing from its ledger
    /// when one exists.
    pub fn open(config: MeasurementConfig, output_dir: &Path) -> Result<Self, EngineError> {
        std::fs::create_dir_all(output_dir).map_err(|e| EngineError::io(output_dir, e))?;
        let ledger_path = output_dir.join(LEDGER_FILE);

        let mut ledger = if ledger_path.exists() {
            let ledger: Ledger = report::read_json(&ledger_path)?;
            let persisted: Vec<&Observable> = ledger.series.keys().collect();
            let mut requested: Vec<&Observable> = config.observables.iter().collect();
            requested.sort();
            if persisted != requested {
                return Err(EngineError::Ledger {
                    dir: output_dir.to_string_lossy().to_string(),
                    reason: "tracked observables differ from the persisted measurement".into(),
                });
            }
            info!(
                dir = %output_dir.display(),
                runs = ledger.runs.len(),
                state = ?ledger.state,
                "Continuing persisted measurement."
            );
            ledger
        } else {
            Ledger::new(&config.observables)
        };

        if let Some(interrupted) = ledger.in_flight.take() {
            warn!(run = interrupted.index, "Recording interrupted run as failed.");
            ledger.runs.push(RunRecord {
                index: interrupted.index,
                dir: interrupted.dir,
                resumed_from: interrupted.resumed_from,
                elapsed_secs: 0.0,
                outcome: RunOutcome::Failed {
                    error: INTERRUPTED.to_string(),
                },
            });
            ledger.consecutive_failures += 1;
            ledger.state = MeasurementState::Analyzing;
        } else if ledger.state == MeasurementState::Running {
            ledger.state = MeasurementState::AwaitingRun;
        }

        let mut measurement = Self {
            config,
            output_dir: output_dir.to_path_buf(),
            ledger,
            stats: BTreeMap::new(),
            report: None,
        };
        measurement.refresh_statistics();
        Ok(measurement)
    }

    pub fn config(&self) -> &MeasurementConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn state(&self) -> MeasurementState {
        self.ledger.state
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn statistics(&self, observable: &Observable) -> Option<&BlockStatistics> {
        self.stats.get(observable)
    }

    /// Drives the state machine to a terminal state and returns the report.
    /// Calling it again on a finished measurement performs no runs.
    #[instrument(skip_all, name = "measurement", fields(dir = %self.output_dir.display()))]
    pub fn run(&mut self, ctx: &RunContext) -> Result<&MeasurementReport, EngineError> {
        if !self.ledger.state.is_terminal() {
            info!(
                observables = self.config.observables.len(),
                targets = self.config.precisions.len(),
                max_runs = self.config.budget.max_runs,
                "Starting measurement."
            );
        }
        while !self.ledger.state.is_terminal() {
            self.step(ctx)?;
        }
        let report = match self.report.take() {
            Some(report) => report,
            None => self.build_report()?,
        };
        Ok(self.report.insert(report))
    }

    /// Performs a single state transition.
    pub fn step(&mut self, ctx: &RunContext) -> Result<MeasurementState, EngineError> {
        match self.ledger.state {
            MeasurementState::AwaitingRun => self.begin_run(ctx)?,
            MeasurementState::Running => self.execute_run(ctx),
            MeasurementState::Analyzing => self.analyze(ctx)?,
            MeasurementState::Converged | MeasurementState::Exhausted => {}
        }
        Ok(self.ledger.state)
    }

    fn begin_run(&mut self, ctx: &RunContext) -> Result<(), EngineError> {
        let index = self.ledger.next_index;
        let resumed_from = self.ledger.last_successful_run().map(|r| r.index);
        self.ledger.next_index += 1;
        self.ledger.in_flight = Some(InFlightRun {
            index,
            dir: self.output_dir.join(run_dir_name(index)),
            resumed_from,
        });
        self.ledger.state = MeasurementState::Running;
        self.persist_ledger()?;

        ctx.reporter.status(match resumed_from {
            Some(prior) => format!("run {} (resuming run {})", index, prior),
            None => format!("run {}", index),
        });
        Ok(())
    }

    fn execute_run(&mut self, ctx: &RunContext) {
        let Some(run) = self.ledger.in_flight.take() else {
            self.ledger.state = MeasurementState::AwaitingRun;
            return;
        };
        let prior = run.resumed_from.and_then(|index| {
            self.ledger
                .runs
                .iter()
                .find(|r| r.index == index)
                .map(|r| RunHandle::new(&r.dir))
        });

        debug!(run = run.index, dir = %run.dir.display(), "Invoking engine.");
        let started = Instant::now();
        let outcome = match ctx
            .engine
            .start_or_resume(&self.config.input, &run.dir, prior.as_ref())
        {
            Ok(handle) => self.absorb_output(ctx, run.index, &handle),
            Err(e) => {
                warn!(run = run.index, error = %e, "Engine run failed.");
                RunOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        let elapsed_secs = started.elapsed().as_secs_f64();

        let record = RunRecord {
            index: run.index,
            dir: run.dir,
            resumed_from: run.resumed_from,
            elapsed_secs,
            outcome,
        };
        if record.succeeded() {
            self.ledger.consecutive_failures = 0;
        } else {
            self.ledger.consecutive_failures += 1;
        }
        self.ledger.elapsed_secs += elapsed_secs;
        self.ledger.runs.push(record);
        self.ledger.state = MeasurementState::Analyzing;
    }

    fn absorb_output(&mut self, ctx: &RunContext, index: usize, handle: &RunHandle) -> RunOutcome {
        let mut samples = BTreeMap::new();
        let mut parse_errors = BTreeMap::new();
        let parsed = ctx.engine.read_observables(handle, &self.config.observables);

        for observable in &self.config.observables {
            match parsed.get(observable) {
                Some(Ok(series)) => {
                    if let Some(merged) = self.ledger.series.get_mut(observable) {
                        merged.extend_run(index, series);
                    }
                    samples.insert(observable.clone(), series.len());
                }
                Some(Err(e)) => {
                    warn!(run = index, observable = %observable, error = %e, "Observable unavailable for run.");
                    parse_errors.insert(observable.clone(), e.to_string());
                }
                None => {
                    warn!(run = index, observable = %observable, "Engine returned no data for observable.");
                    parse_errors.insert(observable.clone(), "no data returned".to_string());
                }
            }
        }
        RunOutcome::Completed {
            samples,
            parse_errors,
        }
    }

    fn analyze(&mut self, ctx: &RunContext) -> Result<(), EngineError> {
        self.refresh_statistics();
        let run_index = self.ledger.runs.last().map_or(0, |r| r.index);
        for (observable, stats) in &self.stats {
            debug!(
                run = run_index,
                observable = %observable,
                mean = stats.mean,
                stderr = stats.stderr,
                equilibration_index = stats.equilibration_index,
                "Merged statistics."
            );
            if let Some(history) = self.ledger.history.get_mut(observable) {
                history.push(HistoryPoint::new(run_index, stats));
            }
        }

        let runs = self.ledger.runs.len();
        let elapsed = Duration::from_secs_f64(self.ledger.elapsed_secs);
        let termination = if self.targets_met() {
            Some(Termination::Converged)
        } else if self.ledger.consecutive_failures >= self.config.max_consecutive_failures {
            Some(Termination::Aborted {
                consecutive_failures: self.ledger.consecutive_failures,
                last_error: self.ledger.last_error().unwrap_or_default(),
            })
        } else if !self.config.budget.allows_another_run(runs, elapsed) {
            Some(Termination::BudgetExhausted {
                runs,
                elapsed_secs: self.ledger.elapsed_secs,
                last_error: self.ledger.last_error(),
            })
        } else {
            None
        };

        self.ledger.state = termination
            .as_ref()
            .map_or(MeasurementState::AwaitingRun, Termination::state);
        self.ledger.termination = termination;

        self.write_convergence_tables()?;
        self.persist_ledger()?;

        if let Some(termination) = &self.ledger.termination {
            let report = self.build_report()?;
            report::write_json(&self.output_dir.join(REPORT_FILE), &report)?;
            info!(
                runs = report.runs,
                missing = report.missing.len(),
                "Measurement finished: {}.",
                termination.describe()
            );
            ctx.reporter.report(Progress::Message(format!(
                "{}: {}",
                self.output_dir.display(),
                termination.describe()
            )));
            self.report = Some(report);
        }
        Ok(())
    }

    fn refresh_statistics(&mut self) {
        self.stats = self
            .ledger
            .series
            .iter()
            .map(|(observable, series)| {
                (
                    observable.clone(),
                    self.config.statistics.analyze(series.samples()),
                )
            })
            .collect();
    }

    fn target_met(&self, observable: &Observable) -> bool {
        let Some(&target) = self.config.precisions.get(observable) else {
            return false;
        };
        self.stats
            .get(observable)
            .is_some_and(|s| s.stderr.is_finite() && s.stderr <= target)
    }

    /// Without precision targets a measurement never converges and runs until
    /// its budget is spent.
    fn targets_met(&self) -> bool {
        !self.config.precisions.is_empty()
            && self.config.precisions.keys().all(|o| self.target_met(o))
    }

    fn build_report(&self) -> Result<MeasurementReport, EngineError> {
        let termination = self
            .ledger
            .termination
            .clone()
            .ok_or_else(|| EngineError::Ledger {
                dir: self.output_dir.to_string_lossy().to_string(),
                reason: "measurement has not terminated".into(),
            })?;

        let mut estimates = BTreeMap::new();
        let mut missing = Vec::new();
        for observable in &self.config.observables {
            let stats = self
                .stats
                .get(observable)
                .copied()
                .unwrap_or_else(BlockStatistics::empty);
            if !(stats.has_mean() && stats.has_stderr()) {
                missing.push(observable.clone());
            }
            estimates.insert(
                observable.clone(),
                ObservableEstimate {
                    mean: stats.has_mean().then_some(stats.mean),
                    stderr: stats.has_stderr().then_some(stats.stderr),
                    equilibration_index: stats.equilibration_index,
                    samples: stats.samples,
                    block_size: stats.block_size,
                    target: self.config.precisions.get(observable).copied(),
                    target_met: self.target_met(observable),
                },
            );
        }

        Ok(MeasurementReport {
            state: termination.state(),
            termination,
            runs: self.ledger.runs.len(),
            successful_runs: self.ledger.runs.iter().filter(|r| r.succeeded()).count(),
            elapsed_secs: self.ledger.elapsed_secs,
            last_run_dir: self.ledger.last_successful_run().map(|r| r.dir.clone()),
            estimates,
            missing,
        })
    }

    fn write_convergence_tables(&self) -> Result<(), EngineError> {
        for (observable, history) in &self.ledger.history {
            let rows: Vec<ConvergenceRow> = history.iter().map(HistoryPoint::to_row).collect();
            let path = self
                .output_dir
                .join(format!("{}_converge.csv", observable.label()));
            report::write_convergence_table(&path, &rows)?;
        }
        Ok(())
    }

    fn persist_ledger(&self) -> Result<(), EngineError> {
        report::write_json(&self.output_dir.join(LEDGER_FILE), &self.ledger)?;
        Ok(())
    }
}
