use super::error::WorkflowError;
use super::sweep::{SweepEntry, SweepOutcome, SweepReport, run_measurement};
use crate::core::control::{ParameterName, ParameterValue};
use crate::core::observable::Observable;
use crate::engine::config::{ConfigError, MeasurementConfig};
use crate::engine::context::RunContext;
use crate::engine::error::EngineError;
use crate::engine::progress::Progress;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_MIN_X_SPACING: f64 = 0.001;
pub const DEFAULT_MIN_Y_SPACING: f64 = 0.1;
pub const DEFAULT_MAX_POINTS: usize = 50;

/// Stopping thresholds of an adaptive sweep over `[low, high]`.
///
/// Spacings are fractions of the full parameter range and of the observable's
/// change between the two endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefineOptions {
    pub low: f64,
    pub high: f64,
    pub min_x_spacing: f64,
    pub min_y_spacing: f64,
    pub max_points: usize,
}

impl RefineOptions {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low,
            high,
            min_x_spacing: DEFAULT_MIN_X_SPACING,
            min_y_spacing: DEFAULT_MIN_Y_SPACING,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Point {
    x: f64,
    y: Option<f64>,
}

/// Sweep that places its points by bisection where the observable changes
/// fastest, instead of on a fixed grid.
///
/// Both endpoints are measured first. An interval is then split at its
/// midpoint while it is wider than `min_x_spacing` and the observable changes
/// across it by more than `min_y_spacing`; intervals touching a point without
/// a usable mean are never split.
#[derive(Debug, Clone)]
pub struct AdaptiveSweep {
    template: MeasurementConfig,
    parameter: ParameterName,
    observable: Observable,
    options: RefineOptions,
    output_dir: PathBuf,
}

impl AdaptiveSweep {
    pub fn new(
        template: &MeasurementConfig,
        parameter: ParameterName,
        observable: Observable,
        options: RefineOptions,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        if parameter == ParameterName::OrderParam {
            return Err(ConfigError::InvalidRefinement(
                "order-parameter windows cannot be bisected".into(),
            ));
        }
        if !template.observables.contains(&observable) {
            return Err(ConfigError::InvalidRefinement(format!(
                "observable '{}' is not tracked",
                observable
            )));
        }
        if !(options.low.is_finite() && options.high.is_finite() && options.low < options.high) {
            return Err(ConfigError::InvalidRefinement(format!(
                "invalid range [{}, {}]",
                options.low, options.high
            )));
        }
        if options.max_points < 2 {
            return Err(ConfigError::InvalidRefinement(
                "at least two points are needed".into(),
            ));
        }
        if !(options.min_x_spacing >= 0.0 && options.min_y_spacing >= 0.0) {
            return Err(ConfigError::InvalidRefinement(
                "spacings must be non-negative".into(),
            ));
        }

        let sweep = Self {
            template: template.clone(),
            parameter,
            observable,
            options,
            output_dir: output_dir.into(),
        };
        // The amendment is the same for every point; check it once up front.
        template
            .input
            .with_parameter(&sweep.value_at(options.low))?;
        Ok(sweep)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn value_at(&self, x: f64) -> ParameterValue {
        match self.parameter {
            ParameterName::Temperature => ParameterValue::Temperature(x),
            ParameterName::MolChemPot => ParameterValue::MolChemPot(x),
            ParameterName::Steps | ParameterName::OrderParam => {
                ParameterValue::Steps(x.round().max(0.0) as u64)
            }
        }
    }

    /// Measures points until no interval qualifies for splitting or
    /// `max_points` measurements are spent. Returns the points sorted by
    /// parameter value and writes them as a sweep report.
    #[instrument(skip_all, name = "refine_workflow", fields(parameter = %self.parameter))]
    pub fn run(&self, ctx: &RunContext) -> Result<SweepReport, WorkflowError> {
        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| EngineError::io(&self.output_dir, e))?;
        ctx.reporter.report(Progress::PhaseStart {
            name: format!("Adaptive sweep over {}", self.parameter),
        });
        ctx.reporter.report(Progress::TaskStart {
            total: self.options.max_points as u64,
        });
        info!(
            low = self.options.low,
            high = self.options.high,
            max_points = self.options.max_points,
            "Starting adaptive sweep."
        );

        let mut entries = Vec::new();
        let mut measured = HashSet::new();
        let low = self.measure(self.options.low, &mut entries, &mut measured, ctx)?;
        let high = self.measure(self.options.high, &mut entries, &mut measured, ctx)?;
        let y_range = match (low.y, high.y) {
            (Some(a), Some(b)) => (b - a).abs(),
            _ => f64::NAN,
        };

        // Depth first, upper half before lower half.
        let mut pending = vec![(low, high)];
        while let Some((a, b)) = pending.pop() {
            if entries.len() >= self.options.max_points {
                break;
            }
            if !self.should_split(a, b, y_range) {
                continue;
            }
            let mid = self.measure(0.5 * (a.x + b.x), &mut entries, &mut measured, ctx)?;
            pending.push((a, mid));
            pending.push((mid, b));
        }
        ctx.reporter.report(Progress::TaskFinish);

        entries.sort_by(|a: &SweepEntry, b: &SweepEntry| {
            a.value.coordinate().total_cmp(&b.value.coordinate())
        });
        let report = SweepReport {
            parameter: self.parameter,
            observables: self.template.observables.clone(),
            entries,
        };
        report.write(&self.output_dir)?;
        info!(points = report.entries.len(), "Adaptive sweep finished.");
        ctx.reporter.report(Progress::PhaseFinish);
        Ok(report)
    }

    fn should_split(&self, a: Point, b: Point, y_range: f64) -> bool {
        let x_fraction = (b.x - a.x) / (self.options.high - self.options.low);
        if x_fraction < self.options.min_x_spacing {
            return false;
        }
        let (Some(ya), Some(yb)) = (a.y, b.y) else {
            return false;
        };
        // Equal endpoint values give no scale for y; only x spacing applies.
        if !(y_range.is_finite() && y_range > 0.0) {
            return true;
        }
        (yb - ya).abs() / y_range >= self.options.min_y_spacing
    }

    /// Measures the point at `x`, or returns it unmeasured if its value
    /// coincides with an earlier point (possible for integer parameters).
    fn measure(
        &self,
        x: f64,
        entries: &mut Vec<SweepEntry>,
        measured: &mut HashSet<String>,
        ctx: &RunContext,
    ) -> Result<Point, WorkflowError> {
        let value = self.value_at(x);
        if !measured.insert(value.dir_name()) {
            debug!(value = %value, "Point already measured; not splitting further.");
            return Ok(Point { x, y: None });
        }

        let input = self.template.input.with_parameter(&value)?;
        let config = self.template.with_input(input);
        let dir = self.output_dir.join(value.dir_name());
        let outcome = match run_measurement(&config, &dir, ctx) {
            Ok(report) => SweepOutcome::Finished { report },
            Err(e) => {
                warn!(value = %value, error = %e, "Measurement failed; interval will not be refined.");
                SweepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        ctx.reporter.report(Progress::TaskIncrement { amount: 1 });

        let entry = SweepEntry { value, dir, outcome };
        let y = entry.report().and_then(|r| r.mean(&self.observable));
        debug!(x, y = ?y, "Measured point.");
        entries.push(entry);
        Ok(Point { x, y })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::control::InputDeck;
    use crate::core::control::tests::template;
    use crate::engine::config::MeasurementConfigBuilder;

    fn config() -> MeasurementConfig {
        MeasurementConfigBuilder::new()
            .observable(Observable::indexed("nmol", [0]))
            .max_runs(1)
            .input(InputDeck::new(template(), Vec::new()))
            .build()
            .unwrap()
    }

    fn sweep(options: RefineOptions) -> AdaptiveSweep {
        AdaptiveSweep::new(
            &config(),
            ParameterName::MolChemPot,
            Observable::indexed("nmol", [0]),
            options,
            "out",
        )
        .unwrap()
    }

    fn point(x: f64, y: f64) -> Point {
        Point { x, y: Some(y) }
    }

    #[test]
    fn rejects_invalid_setups() {
        let nmol = Observable::indexed("nmol", [0]);
        let bad = |parameter, observable: Observable, options| {
            AdaptiveSweep::new(&config(), parameter, observable, options, "out")
        };
        assert!(matches!(
            bad(ParameterName::OrderParam, nmol.clone(), RefineOptions::new(0.0, 1.0)),
            Err(ConfigError::InvalidRefinement(_))
        ));
        assert!(matches!(
            bad(ParameterName::MolChemPot, Observable::new("energy"), RefineOptions::new(0.0, 1.0)),
            Err(ConfigError::InvalidRefinement(_))
        ));
        assert!(matches!(
            bad(ParameterName::MolChemPot, nmol.clone(), RefineOptions::new(1.0, 1.0)),
            Err(ConfigError::InvalidRefinement(_))
        ));
        let single = RefineOptions {
            max_points: 1,
            ..RefineOptions::new(0.0, 1.0)
        };
        assert!(matches!(
            bad(ParameterName::MolChemPot, nmol, single),
            Err(ConfigError::InvalidRefinement(_))
        ));
    }

    #[test]
    fn splits_only_wide_intervals_with_large_change() {
        let s = sweep(RefineOptions {
            min_x_spacing: 0.1,
            min_y_spacing: 0.2,
            ..RefineOptions::new(0.0, 1.0)
        });
        assert!(s.should_split(point(0.0, 0.0), point(0.5, 5.0), 10.0));
        assert!(!s.should_split(point(0.0, 0.0), point(0.05, 5.0), 10.0));
        assert!(!s.should_split(point(0.0, 0.0), point(0.5, 1.0), 10.0));
        assert!(!s.should_split(point(0.0, 0.0), Point { x: 0.5, y: None }, 10.0));
        assert!(s.should_split(point(0.0, 3.0), point(0.5, 3.0), 0.0));
    }

    #[test]
    fn integer_parameters_round_to_whole_values() {
        let s = AdaptiveSweep::new(
            &config(),
            ParameterName::Steps,
            Observable::indexed("nmol", [0]),
            RefineOptions::new(100.0, 200.0),
            "out",
        )
        .unwrap();
        assert_eq!(s.value_at(150.4), ParameterValue::Steps(150));
    }
}
