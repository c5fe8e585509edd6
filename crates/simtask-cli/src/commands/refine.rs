use crate::cli::RefineArgs;
use crate::config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use simtask::engine::context::RunContext;
use simtask::engine::progress::ProgressReporter;
use simtask::workflows::refine::AdaptiveSweep;
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: RefineArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Building adaptive sweep from job file {:?}", &args.job.config);
    let plan = config::build_refine(&args)?;
    let refine = AdaptiveSweep::new(
        &plan.app.measurement,
        plan.parameter,
        plan.observable.clone(),
        plan.options,
        plan.app.output_dir.clone(),
    )?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let ctx = RunContext::new(&plan.app.engine, &reporter);

    info!(
        low = plan.options.low,
        high = plan.options.high,
        "Refining {} against {}", plan.observable, plan.parameter
    );
    let report = tokio::task::block_in_place(|| refine.run(&ctx))?;

    println!(
        "Measured {} point(s) of {} over {}:",
        report.entries.len(),
        plan.observable,
        plan.parameter
    );
    for row in report.rows(&plan.observable) {
        println!("  {:<14} {:>14.6e} ± {:.3e}", row.value, row.mean, row.stderr);
    }
    println!("Sweep tables written to: {}", refine.output_dir().display());
    Ok(())
}
