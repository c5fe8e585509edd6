use thiserror::Error;

use crate::core::control::ControlError;
use crate::core::io::report::ReportError;
use crate::core::io::tmatrix::MatrixError;
use crate::engine::config::ConfigError;
use crate::engine::error::EngineError;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Engine error: {source}")]
    Engine {
        #[from]
        source: EngineError,
    },

    #[error("Control input error: {source}")]
    Control {
        #[from]
        source: ControlError,
    },

    #[error("Transition matrix error: {source}")]
    Matrix {
        #[from]
        source: MatrixError,
    },

    #[error("Failed to write report: {source}")]
    Report {
        #[from]
        source: ReportError,
    },

    #[error("No window of the free-energy sweep produced a transition matrix")]
    NoUsableWindows,
}
