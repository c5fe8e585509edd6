use super::error::WorkflowError;
use crate::core::control::{ParameterName, ParameterValue};
use crate::core::io::report::{self, ReportError, SweepRow};
use crate::core::observable::Observable;
use crate::engine::config::{ConfigError, MeasurementConfig};
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::measurement::{Measurement, MeasurementReport};
use crate::engine::progress::Progress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const SWEEP_REPORT_FILE: &str = "sweep_report.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum SweepOutcome {
    Finished { report: MeasurementReport },
    /// The measurement could not be carried out at all (e.g. its ledger could
    /// not be written). Sibling values are unaffected.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEntry {
    pub value: ParameterValue,
    pub dir: PathBuf,
    pub outcome: SweepOutcome,
}

impl SweepEntry {
    pub fn report(&self) -> Option<&MeasurementReport> {
        match &self.outcome {
            SweepOutcome::Finished { report } => Some(report),
            SweepOutcome::Failed { .. } => None,
        }
    }
}

/// Per-value results of a sweep, in the order the values were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub parameter: ParameterName,
    pub observables: Vec<Observable>,
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    pub fn entry(&self, value: &ParameterValue) -> Option<&SweepEntry> {
        self.entries.iter().find(|e| e.value == *value)
    }

    /// Mean-keyed rows for one observable. Values without a usable mean are
    /// left out; a missing standard error is reported as NaN.
    pub fn rows(&self, observable: &Observable) -> Vec<SweepRow> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let report = entry.report()?;
                let mean = report.mean(observable)?;
                Some(SweepRow {
                    value: entry.value.to_string(),
                    mean,
                    stderr: report.stderr(observable).unwrap_or(f64::NAN),
                })
            })
            .collect()
    }

    /// Writes `sweep_report.json` and one `<label>_sweep.csv` per observable.
    pub fn write(&self, dir: &Path) -> Result<(), ReportError> {
        report::write_json(&dir.join(SWEEP_REPORT_FILE), self)?;
        for observable in &self.observables {
            let path = dir.join(format!("{}_sweep.csv", observable.label()));
            report::write_sweep_table(&path, &self.rows(observable))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SweepPoint {
    value: ParameterValue,
    config: MeasurementConfig,
}

/// One independent measurement per value of a control parameter.
///
/// Every value owns a configuration built from the shared template plus that
/// one amended field; all of them are built (and validated) before any engine
/// run starts.
#[derive(Debug, Clone)]
pub struct MeasurementSweep {
    parameter: ParameterName,
    observables: Vec<Observable>,
    points: Vec<SweepPoint>,
    output_dir: PathBuf,
}

impl MeasurementSweep {
    pub fn new(
        template: &MeasurementConfig,
        parameter: ParameterName,
        values: Vec<ParameterValue>,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::EmptySweep);
        }

        let mut dir_names = HashSet::new();
        let mut points = Vec::with_capacity(values.len());
        for value in values {
            if value.name() != parameter {
                return Err(ConfigError::ParameterMismatch {
                    expected: parameter,
                    found: value.name(),
                });
            }
            if !dir_names.insert(value.dir_name()) {
                return Err(ConfigError::DuplicateValue(value.to_string()));
            }
            let input = template.input.with_parameter(&value)?;
            points.push(SweepPoint {
                value,
                config: template.with_input(input),
            });
        }

        Ok(Self {
            parameter,
            observables: template.observables.clone(),
            points,
            output_dir: output_dir.into(),
        })
    }

    pub fn parameter(&self) -> ParameterName {
        self.parameter
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn values(&self) -> impl Iterator<Item = &ParameterValue> {
        self.points.iter().map(|p| &p.value)
    }

    pub fn config_for(&self, value: &ParameterValue) -> Option<&MeasurementConfig> {
        self.points
            .iter()
            .find(|p| p.value == *value)
            .map(|p| &p.config)
    }

    pub fn dir_for(&self, value: &ParameterValue) -> PathBuf {
        self.output_dir.join(value.dir_name())
    }

    /// Runs every value to a terminal state and writes the sweep report.
    ///
    /// Values run one after another unless the `parallel` feature is enabled,
    /// in which case they share the current rayon pool.
    /// A value whose measurement fails outright is recorded as failed and the
    /// sweep moves on.
    #[instrument(skip_all, name = "sweep_workflow", fields(parameter = %self.parameter))]
    pub fn run(&self, ctx: &RunContext) -> Result<SweepReport, WorkflowError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| EngineError::io(&self.output_dir, e))?;

        ctx.reporter.report(Progress::PhaseStart {
            name: format!("Sweep over {}", self.parameter),
        });
        info!(
            values = self.points.len(),
            dir = %self.output_dir.display(),
            "Starting sweep."
        );
        ctx.reporter.report(Progress::TaskStart {
            total: self.points.len() as u64,
        });

        #[cfg(not(feature = "parallel"))]
        let iterator = self.points.iter();

        #[cfg(feature = "parallel")]
        let iterator = self.points.par_iter();

        let entries: Vec<SweepEntry> = iterator.map(|point| self.measure(point, ctx)).collect();
        ctx.reporter.report(Progress::TaskFinish);

        let report = SweepReport {
            parameter: self.parameter,
            observables: self.observables.clone(),
            entries,
        };
        report.write(&self.output_dir)?;

        let failed = report.entries.iter().filter(|e| e.report().is_none()).count();
        info!(
            values = report.entries.len(),
            failed, "Sweep finished."
        );
        ctx.reporter.report(Progress::PhaseFinish);
        Ok(report)
    }

    fn measure(&self, point: &SweepPoint, ctx: &RunContext) -> SweepEntry {
        let dir = self.dir_for(&point.value);
        let outcome = match run_measurement(&point.config, &dir, ctx) {
            Ok(report) => SweepOutcome::Finished { report },
            Err(e) => {
                warn!(value = %point.value, error = %e, "Measurement failed; continuing sweep.");
                SweepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        ctx.reporter.report(Progress::TaskIncrement { amount: 1 });
        SweepEntry {
            value: point.value,
            dir,
            outcome,
        }
    }
}

pub(crate) fn run_measurement(
    config: &MeasurementConfig,
    dir: &Path,
    ctx: &RunContext,
) -> Result<MeasurementReport, EngineError> {
    let mut measurement = Measurement::open(config.clone(), dir)?;
    let report = measurement.run(ctx)?.clone();
    Ok(report)
}
