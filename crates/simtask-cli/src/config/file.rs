use crate::error::{CliError, Result};
use serde::Deserialize;
use simtask::core::control::ParameterName;
use simtask::core::observable::Observable;
use simtask::core::stats::StatisticsConfig;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A job file as written by the user. Every field is optional here; missing
/// values are filled from CLI flags or defaults by the builder.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    /// Control template in TOML form.
    pub control: Option<PathBuf>,
    /// Auxiliary input files copied into every run directory.
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default)]
    pub observables: Vec<Observable>,
    /// Maximum standard error per observable.
    #[serde(default)]
    pub precision: BTreeMap<Observable, f64>,
    pub engine: Option<FileEngineConfig>,
    pub budget: Option<FileBudgetConfig>,
    pub statistics: Option<StatisticsConfig>,
    pub sweep: Option<FileSweepConfig>,
    pub fed: Option<FileFedConfig>,
    pub refine: Option<FileRefineConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEngineConfig {
    pub executable: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    pub output_file: Option<String>,
    pub carry_forward: Option<Vec<FileCarryForward>>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileCarryForward {
    pub from: String,
    pub to: String,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileBudgetConfig {
    pub max_runs: Option<usize>,
    /// Seconds.
    pub max_time: Option<f64>,
    pub max_consecutive_failures: Option<usize>,
}

/// A sweep value as it may appear in TOML: a bare number or a string such as
/// an order-parameter window `"lo:hi"`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FileValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FileValue {
    pub fn to_raw(&self) -> String {
        match self {
            FileValue::Integer(i) => i.to_string(),
            FileValue::Float(x) => x.to_string(),
            FileValue::Text(s) => s.clone(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSweepConfig {
    pub parameter: Option<ParameterName>,
    pub values: Option<Vec<FileValue>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileFedConfig {
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub stride: Option<i64>,
    pub bin_width: Option<f64>,
    pub final_max_runs: Option<usize>,
    /// Seconds.
    pub final_max_time: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileRefineConfig {
    pub parameter: Option<ParameterName>,
    pub observable: Option<Observable>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub min_x_spacing: Option<f64>,
    pub min_y_spacing: Option<f64>,
    pub max_points: Option<usize>,
}

impl FileConfig {
    /// Reads a job file. Relative paths inside it are resolved against the
    /// directory containing the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading job file from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.control = config.control.map(|p| base.join(p));
        config.files = config.files.iter().map(|p| base.join(p)).collect();
        if let Some(engine) = config.engine.as_mut() {
            engine.executable = engine.executable.take().map(|p| resolve_executable(base, p));
        }
        Ok(config)
    }
}

/// Bare executable names are looked up on `PATH` by the OS and stay as given;
/// anything with a directory component is taken relative to the job file.
fn resolve_executable(base: &Path, executable: PathBuf) -> PathBuf {
    if executable.components().count() > 1 && executable.is_relative() {
        base.join(executable)
    } else {
        executable
    }
}
