use simtask::core::control::{ParameterName, ParameterValue};
use simtask::core::observable::Observable;
use simtask::engine::config::{Budget, MeasurementConfig};
use simtask::engine::process::ProcessEngine;
use simtask::workflows::fed::WindowPartition;
use simtask::workflows::refine::RefineOptions;
use std::path::PathBuf;

/// Settings every job shares: how to run the engine, the measurement
/// template, and where results go.
pub struct AppConfig {
    pub engine: ProcessEngine,
    pub measurement: MeasurementConfig,
    pub output_dir: PathBuf,
}

pub struct SweepPlan {
    pub app: AppConfig,
    pub parameter: ParameterName,
    pub values: Vec<ParameterValue>,
}

pub struct FedPlan {
    pub app: AppConfig,
    pub partition: WindowPartition,
    pub final_budget: Budget,
}

pub struct RefinePlan {
    pub app: AppConfig,
    pub parameter: ParameterName,
    pub observable: Observable,
    pub options: RefineOptions,
}
