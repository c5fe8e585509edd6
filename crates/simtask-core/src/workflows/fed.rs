use super::error::WorkflowError;
use super::sweep::{MeasurementSweep, SweepReport, run_measurement};
use crate::core::control::{
    BinGrid, ControlError, FedMode, InputDeck, OrderWindow, ParameterName, ParameterValue,
};
use crate::core::io::report;
use crate::core::io::tmatrix::TransitionMatrix;
use crate::engine::config::{Budget, ConfigError, MeasurementConfig};
use crate::engine::context::RunContext;
use crate::engine::measurement::MeasurementReport;
use crate::engine::progress::Progress;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Transition matrix accumulated by the engine in each run directory.
pub const WINDOW_MATRIX_FILE: &str = "TMATRX.000";
/// Combined matrix, read by the engine on restart.
pub const COMBINED_MATRIX_FILE: &str = "TMATRX";
pub const FINAL_RUN_DIR: &str = "final";
pub const FED_REPORT_FILE: &str = "fed_report.json";

pub const DEFAULT_FINAL_MAX_RUNS: usize = 100;
pub const DEFAULT_FINAL_MAX_TIME: Duration = Duration::from_secs(600);

const BIN_EPSILON: f64 = 1e-9;

/// One window of the order parameter and the binning it is sampled on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FedWindow {
    pub window: OrderWindow,
    pub grid: BinGrid,
}

/// Overlapping windows over one shared order-parameter grid.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPartition {
    grid: BinGrid,
    windows: Vec<OrderWindow>,
}

impl WindowPartition {
    /// Partitions the integer range `[min_val, max_val]` into windows starting
    /// every `stride` values, each overlapping the next by one bin. Bins are
    /// `bin_width` wide and centred on the grid points, so the global grid
    /// spans `[min_val - w/2, max_val + w/2]`.
    pub fn new(min_val: i64, max_val: i64, stride: i64, bin_width: f64) -> Result<Self, ConfigError> {
        if max_val <= min_val {
            return Err(ConfigError::InvalidPartition(format!(
                "empty range [{}, {}]",
                min_val, max_val
            )));
        }
        if stride <= 0 {
            return Err(ConfigError::InvalidPartition(format!(
                "stride must be positive, got {}",
                stride
            )));
        }
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(ConfigError::InvalidPartition(format!(
                "bin width must be positive, got {}",
                bin_width
            )));
        }
        let intervals = (max_val - min_val) as f64 / bin_width;
        if (intervals - intervals.round()).abs() > BIN_EPSILON {
            return Err(ConfigError::InvalidPartition(format!(
                "range [{}, {}] is not a whole number of {}-wide bins",
                min_val, max_val, bin_width
            )));
        }

        let half = 0.5 * bin_width;
        let grid = BinGrid {
            ngrid: intervals.round() as usize + 1,
            xmin: min_val as f64 - half,
            xmax: max_val as f64 + half,
        };
        let windows = (min_val..max_val)
            .step_by(stride as usize)
            .map(|start| OrderWindow {
                lo: start as f64 - half,
                hi: ((start + stride) as f64 + half).min(grid.xmax),
            })
            .collect();
        Ok(Self { grid, windows })
    }

    /// Builds a partition from explicit windows. Every window must be sampled
    /// on bins aligned with `grid` and lie inside it.
    pub fn from_windows(grid: BinGrid, windows: Vec<FedWindow>) -> Result<Self, ConfigError> {
        if windows.is_empty() {
            return Err(ConfigError::InvalidPartition("no windows".into()));
        }
        for w in &windows {
            if !w.grid.is_aligned_with(&grid) {
                return Err(ConfigError::InconsistentBins {
                    window: w.window.to_string(),
                    expected: grid,
                    found: w.grid,
                });
            }
            if !grid.contains(&w.window) {
                return Err(ConfigError::InvalidPartition(format!(
                    "window {} lies outside [{}, {}]",
                    w.window, grid.xmin, grid.xmax
                )));
            }
        }
        Ok(Self {
            grid,
            windows: windows.into_iter().map(|w| w.window).collect(),
        })
    }

    pub fn grid(&self) -> BinGrid {
        self.grid
    }

    pub fn windows(&self) -> &[OrderWindow] {
        &self.windows
    }

    pub fn values(&self) -> Vec<ParameterValue> {
        self.windows.iter().copied().map(ParameterValue::Window).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FedReport {
    pub windows: SweepReport,
    /// Windows left out of the combined matrix because none of their runs
    /// succeeded. Their range carries no transitions.
    pub skipped_windows: Vec<ParameterValue>,
    pub combined_matrix: PathBuf,
    pub final_run: MeasurementReport,
}

/// Free-energy sweep: independent transition-matrix measurements per window,
/// their matrices summed into one global matrix, then a final run restarted
/// from the combined matrix over the whole order-parameter range.
#[derive(Debug, Clone)]
pub struct FedSweep {
    partition: WindowPartition,
    windows: MeasurementSweep,
    final_config: MeasurementConfig,
    output_dir: PathBuf,
}

impl FedSweep {
    pub fn new(
        template: &MeasurementConfig,
        partition: WindowPartition,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let output_dir = output_dir.into();
        if template.budget.max_time.is_none() {
            return Err(ConfigError::MissingTimeBudget("free-energy window sweeps"));
        }

        let mut control = template.input.control.clone();
        let fed = control.fed_mut().ok_or(ControlError::NoFedBlock)?;
        fed.order_parameter.grid = partition.grid();
        fed.order_parameter.window = None;
        fed.method.set_mode(FedMode::New);
        let window_deck = InputDeck::new(control, template.input.files.clone());

        let windows = MeasurementSweep::new(
            &template.with_input(window_deck.clone()),
            ParameterName::OrderParam,
            partition.values(),
            output_dir.clone(),
        )?;

        let mut final_deck = window_deck;
        if let Some(fed) = final_deck.control.fed_mut() {
            fed.method.set_mode(FedMode::Resume);
        }
        final_deck.files.push(output_dir.join(COMBINED_MATRIX_FILE));
        let final_config = template.with_input(final_deck).with_budget(Budget {
            max_runs: DEFAULT_FINAL_MAX_RUNS,
            max_time: Some(DEFAULT_FINAL_MAX_TIME),
        });

        Ok(Self {
            partition,
            windows,
            final_config,
            output_dir,
        })
    }

    pub fn with_final_budget(mut self, budget: Budget) -> Self {
        self.final_config = self.final_config.with_budget(budget);
        self
    }

    pub fn partition(&self) -> &WindowPartition {
        &self.partition
    }

    pub fn windows(&self) -> &MeasurementSweep {
        &self.windows
    }

    pub fn final_config(&self) -> &MeasurementConfig {
        &self.final_config
    }

    #[instrument(skip_all, name = "fed_workflow", fields(windows = self.partition.windows().len()))]
    pub fn run(&self, ctx: &RunContext) -> Result<FedReport, WorkflowError> {
        info!(
            ngrid = self.partition.grid().ngrid,
            xmin = self.partition.grid().xmin,
            xmax = self.partition.grid().xmax,
            "Starting free-energy window sweep."
        );
        let windows = self.windows.run(ctx)?;

        // === Aggregation: every window has reached a terminal state here ===
        ctx.reporter.phase("Combining transition matrices");
        let (matrices, skipped_windows) = collect_window_matrices(&windows)?;
        let combined = TransitionMatrix::combine(matrices.iter())?;
        let combined_path = self.output_dir.join(COMBINED_MATRIX_FILE);
        combined.write_to_path(&combined_path)?;
        let (bins, width) = combined.shape();
        info!(
            windows = matrices.len(),
            skipped = skipped_windows.len(),
            bins,
            width,
            path = %combined_path.display(),
            "Combined transition matrix written."
        );
        ctx.reporter.report(Progress::PhaseFinish);

        ctx.reporter.phase("Final run");
        let final_run = run_measurement(
            &self.final_config,
            &self.output_dir.join(FINAL_RUN_DIR),
            ctx,
        )?;
        ctx.reporter.report(Progress::PhaseFinish);

        let report = FedReport {
            windows,
            skipped_windows,
            combined_matrix: combined_path,
            final_run,
        };
        report::write_json(&self.output_dir.join(FED_REPORT_FILE), &report)?;
        Ok(report)
    }
}

/// Reads the matrix left by the last successful run of every window. Windows
/// without any successful run are skipped and returned alongside.
fn collect_window_matrices(
    windows: &SweepReport,
) -> Result<(Vec<TransitionMatrix>, Vec<ParameterValue>), WorkflowError> {
    let mut matrices = Vec::with_capacity(windows.entries.len());
    let mut skipped = Vec::new();
    for entry in &windows.entries {
        let Some(dir) = entry.report().and_then(|r| r.last_run_dir.as_deref()) else {
            warn!(window = %entry.value, "Window produced no successful run; skipping.");
            skipped.push(entry.value);
            continue;
        };
        matrices.push(read_window_matrix(dir)?);
    }
    if matrices.is_empty() {
        return Err(WorkflowError::NoUsableWindows);
    }
    Ok((matrices, skipped))
}

fn read_window_matrix(run_dir: &Path) -> Result<TransitionMatrix, WorkflowError> {
    Ok(TransitionMatrix::read_from_path(
        &run_dir.join(WINDOW_MATRIX_FILE),
    )?)
}
