use crate::cli::FedArgs;
use crate::config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use simtask::engine::context::RunContext;
use simtask::engine::progress::ProgressReporter;
use simtask::workflows::fed::FedSweep;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: FedArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Building window partition from job file {:?}", &args.job.config);
    let plan = config::build_fed(&args)?;
    let fed = FedSweep::new(
        &plan.app.measurement,
        plan.partition,
        plan.app.output_dir.clone(),
    )?
    .with_final_budget(plan.final_budget);

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let ctx = RunContext::new(&plan.app.engine, &reporter);

    info!(
        windows = fed.partition().windows().len(),
        ngrid = fed.partition().grid().ngrid,
        "Invoking the free-energy window workflow."
    );
    let report = tokio::task::block_in_place(|| fed.run(&ctx))?;

    let skipped = report.skipped_windows.len();
    if skipped > 0 {
        warn!(skipped, "Some windows produced no transition matrix.");
        println!(
            "Warning: {} of {} window(s) produced no transition matrix:",
            skipped,
            report.windows.entries.len()
        );
        for window in &report.skipped_windows {
            println!("  {}", window);
        }
    }
    println!(
        "Combined transition matrix written to: {}",
        report.combined_matrix.display()
    );
    super::print_report(&report.final_run);
    Ok(())
}
