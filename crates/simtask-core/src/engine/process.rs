use super::error::EngineError;
use super::interface::{Engine, RunHandle};
use crate::core::control::{FedMode, InputDeck};
use crate::core::io::yamldata::{ParseError, PeriodicOutput};
use crate::core::observable::Observable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

pub const CONTROL_FILE: &str = "CONTROL";
pub const DEFAULT_OUTPUT_FILE: &str = "YAMLDATA";
pub const STDOUT_FILE: &str = "OUTPUT.stdout";
pub const STDERR_FILE: &str = "OUTPUT.stderr";

/// A file copied from the prior run directory into a resumed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarryForward {
    pub from: String,
    pub to: String,
}

impl CarryForward {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

pub fn default_carry_forward() -> Vec<CarryForward> {
    vec![CarryForward::new("REVCON", "CONFIG")]
}

/// Files carried forward only when the control input has a FED block.
pub fn default_fed_carry_forward() -> Vec<CarryForward> {
    vec![CarryForward::new("TMATRX.000", "TMATRX")]
}

/// Prepares `working_dir` for one engine invocation.
///
/// The directory must be absent or empty. The rendered control input and every
/// deck file are written into it; when resuming, the carry-forward files are
/// copied from the prior run and a FED block is switched to resume mode.
pub fn stage_input(
    deck: &InputDeck,
    working_dir: &Path,
    prior: Option<&RunHandle>,
    carry_forward: &[CarryForward],
) -> Result<(), EngineError> {
    let launch_error = |reason: String| EngineError::Launch {
        dir: working_dir.to_string_lossy().to_string(),
        reason,
    };

    if working_dir.exists() {
        let mut entries = fs::read_dir(working_dir).map_err(|e| EngineError::io(working_dir, e))?;
        if entries.next().is_some() {
            return Err(launch_error("directory conflict: working directory is not empty".into()));
        }
    }
    fs::create_dir_all(working_dir).map_err(|e| EngineError::io(working_dir, e))?;

    let mut control = deck.control.clone();
    if prior.is_some() {
        if let Some(fed) = control.fed_mut() {
            fed.method.set_mode(FedMode::Resume);
        }
    }
    let control_path = working_dir.join(CONTROL_FILE);
    fs::write(&control_path, control.to_string()).map_err(|e| EngineError::io(&control_path, e))?;

    for source in &deck.files {
        let name = source
            .file_name()
            .ok_or_else(|| launch_error(format!("input '{}' has no file name", source.display())))?;
        fs::copy(source, working_dir.join(name)).map_err(|e| {
            launch_error(format!("cannot copy input '{}': {}", source.display(), e))
        })?;
    }

    if let Some(prior) = prior {
        for item in carry_forward {
            let from = prior.dir.join(&item.from);
            fs::copy(&from, working_dir.join(&item.to)).map_err(|e| {
                launch_error(format!("cannot carry forward '{}': {}", from.display(), e))
            })?;
        }
    }
    debug!(
        dir = %working_dir.display(),
        files = deck.files.len(),
        resumed = prior.is_some(),
        "Staged engine input."
    );
    Ok(())
}

/// Runs the engine as an external executable in each working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessEngine {
    executable: PathBuf,
    args: Vec<String>,
    output_file: String,
    carry_forward: Vec<CarryForward>,
    fed_carry_forward: Vec<CarryForward>,
}

impl ProcessEngine {
    /// A relative executable path with a directory component is resolved
    /// against the current directory, since the engine is started inside each
    /// run directory. Bare names are left for `PATH` lookup.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: resolve_program(executable.into()),
            args: Vec::new(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            carry_forward: default_carry_forward(),
            fed_carry_forward: default_fed_carry_forward(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_output_file(mut self, name: impl Into<String>) -> Self {
        self.output_file = name.into();
        self
    }

    pub fn with_carry_forward(mut self, files: Vec<CarryForward>) -> Self {
        self.carry_forward = files;
        self
    }

    pub fn with_fed_carry_forward(mut self, files: Vec<CarryForward>) -> Self {
        self.fed_carry_forward = files;
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn carry_forward_for(&self, deck: &InputDeck) -> Vec<CarryForward> {
        let mut files = self.carry_forward.clone();
        if deck.control.fed().is_some() {
            files.extend(self.fed_carry_forward.iter().cloned());
        }
        files
    }
}

fn resolve_program(executable: PathBuf) -> PathBuf {
    if executable.is_relative() && executable.components().count() > 1 {
        std::path::absolute(&executable).unwrap_or(executable)
    } else {
        executable
    }
}

impl Engine for ProcessEngine {
    fn start_or_resume(
        &self,
        deck: &InputDeck,
        working_dir: &Path,
        prior: Option<&RunHandle>,
    ) -> Result<RunHandle, EngineError> {
        stage_input(deck, working_dir, prior, &self.carry_forward_for(deck))?;

        let stdout_path = working_dir.join(STDOUT_FILE);
        let stderr_path = working_dir.join(STDERR_FILE);
        let stdout = File::create(&stdout_path).map_err(|e| EngineError::io(&stdout_path, e))?;
        let stderr = File::create(&stderr_path).map_err(|e| EngineError::io(&stderr_path, e))?;

        info!(
            executable = %self.executable.display(),
            dir = %working_dir.display(),
            "Launching engine."
        );
        let status = Command::new(&self.executable)
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .status()
            .map_err(|e| EngineError::Launch {
                dir: working_dir.to_string_lossy().to_string(),
                reason: format!("cannot start '{}': {}", self.executable.display(), e),
            })?;

        if !status.success() {
            warn!(dir = %working_dir.display(), %status, "Engine exited unsuccessfully.");
            return Err(EngineError::RunFailed {
                dir: working_dir.to_string_lossy().to_string(),
                reason: format!("engine exited with {}", status),
            });
        }
        Ok(RunHandle::new(working_dir))
    }

    fn read_observables(
        &self,
        run: &RunHandle,
        observables: &[Observable],
    ) -> BTreeMap<Observable, Result<Vec<f64>, ParseError>> {
        let path = run.dir.join(&self.output_file);
        let output = PeriodicOutput::read(&path);
        observables
            .iter()
            .map(|observable| {
                let series = match &output {
                    Ok(output) => output.series(observable),
                    Err(e) => Err(ParseError::Unreadable {
                        path: path.to_string_lossy().to_string(),
                        reason: e.to_string(),
                    }),
                };
                (observable.clone(), series)
            })
            .collect()
    }
}
