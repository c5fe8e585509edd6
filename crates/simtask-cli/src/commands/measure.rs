use crate::cli::MeasureArgs;
use crate::config;
use crate::error::Result;
use crate::ui::{CliProgressHandler, UiEvent};
use simtask::engine::context::RunContext;
use simtask::engine::measurement::Measurement;
use simtask::engine::progress::{Progress, ProgressReporter};
use tokio::sync::mpsc;
use tracing::info;

pub async fn run(args: MeasureArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Building measurement from job file {:?}", &args.job.config);
    let app = config::build_measure(&args)?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let ctx = RunContext::new(&app.engine, &reporter);

    let mut measurement = Measurement::open(app.measurement, &app.output_dir)?;
    info!(
        state = ?measurement.state(),
        "Opened measurement in {:?}",
        &app.output_dir
    );

    reporter.report(Progress::PhaseStart {
        name: format!("Measuring in {}", app.output_dir.display()),
    });
    let report = tokio::task::block_in_place(|| measurement.run(&ctx))?.clone();
    reporter.report(Progress::PhaseFinish);

    super::print_report(&report);
    println!("Results written to: {}", app.output_dir.display());
    Ok(())
}
