use crate::cli::SweepArgs;
use crate::config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use simtask::engine::context::RunContext;
use simtask::engine::progress::ProgressReporter;
use simtask::workflows::sweep::{MeasurementSweep, SweepOutcome};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: SweepArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Building sweep from job file {:?}", &args.job.config);
    let plan = config::build_sweep(&args)?;
    let sweep = MeasurementSweep::new(
        &plan.app.measurement,
        plan.parameter,
        plan.values,
        plan.app.output_dir.clone(),
    )?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let ctx = RunContext::new(&plan.app.engine, &reporter);

    info!(
        values = sweep.values().count(),
        "Invoking the sweep over {}", plan.parameter
    );
    let report = tokio::task::block_in_place(|| sweep.run(&ctx))?;

    println!("Sweep over {} complete:", report.parameter);
    for entry in &report.entries {
        let value = entry.value.to_string();
        match &entry.outcome {
            SweepOutcome::Finished { report } => {
                println!("  {:<14} {}", value, report.termination.describe())
            }
            SweepOutcome::Failed { error } => {
                warn!(value = %entry.value, "Sweep value failed: {}", error);
                println!("  {:<14} failed: {}", value, error)
            }
        }
    }
    println!("Sweep tables written to: {}", sweep.output_dir().display());
    Ok(())
}
