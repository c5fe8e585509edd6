use simtask::engine::config::DEFAULT_MAX_CONSECUTIVE_FAILURES;
use simtask::engine::process::DEFAULT_OUTPUT_FILE;
use simtask::workflows::fed::{DEFAULT_FINAL_MAX_RUNS, DEFAULT_FINAL_MAX_TIME};
use simtask::workflows::refine::{DEFAULT_MAX_POINTS, DEFAULT_MIN_X_SPACING, DEFAULT_MIN_Y_SPACING};

pub struct DefaultsConfig {
    pub max_runs: usize,
    pub max_consecutive_failures: usize,
    pub output_file: String,
    pub bin_width: f64,
    pub final_max_runs: usize,
    pub final_max_time_secs: f64,
    pub min_x_spacing: f64,
    pub min_y_spacing: f64,
    pub max_points: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            max_runs: 20,
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            bin_width: 1.0,
            final_max_runs: DEFAULT_FINAL_MAX_RUNS,
            final_max_time_secs: DEFAULT_FINAL_MAX_TIME.as_secs_f64(),
            min_x_spacing: DEFAULT_MIN_X_SPACING,
            min_y_spacing: DEFAULT_MIN_Y_SPACING,
            max_points: DEFAULT_MAX_POINTS,
        }
    }
}
