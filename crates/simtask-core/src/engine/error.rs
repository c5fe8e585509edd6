use thiserror::Error;

use super::config::ConfigError;
use crate::core::io::report::ReportError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to launch engine in '{dir}': {reason}")]
    Launch { dir: String, reason: String },

    #[error("Engine run in '{dir}' failed: {reason}")]
    RunFailed { dir: String, reason: String },

    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to persist measurement data: {source}")]
    Persistence {
        #[from]
        source: ReportError,
    },

    #[error("Measurement ledger in '{dir}' is inconsistent: {reason}")]
    Ledger { dir: String, reason: String },
}

impl EngineError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string_lossy().to_string(),
            source,
        }
    }
}
