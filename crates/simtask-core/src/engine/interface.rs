use super::error::EngineError;
use crate::core::control::InputDeck;
use crate::core::io::yamldata::ParseError;
use crate::core::observable::Observable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A completed engine invocation, identified by its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub dir: PathBuf,
}

impl RunHandle {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// Capability to run the external simulation engine.
///
/// Implementations block until the engine exits. A resumed run continues the
/// state (configuration, random number streams, accumulated bias) of `prior`
/// so that its sample series extends the prior one.
pub trait Engine: Send + Sync {
    fn start_or_resume(
        &self,
        deck: &InputDeck,
        working_dir: &Path,
        prior: Option<&RunHandle>,
    ) -> Result<RunHandle, EngineError>;

    /// Extracts the requested observables from a run's periodic output. Each
    /// observable succeeds or fails independently.
    fn read_observables(
        &self,
        run: &RunHandle,
        observables: &[Observable],
    ) -> BTreeMap<Observable, Result<Vec<f64>, ParseError>>;
}
