pub mod fed;
pub mod measure;
pub mod refine;
pub mod sweep;

use simtask::engine::measurement::{MeasurementReport, ObservableEstimate};

fn estimate_line(observable: &str, estimate: &ObservableEstimate) -> String {
    let target = match (estimate.target, estimate.target_met) {
        (Some(t), true) => format!("  [target {:.3e} met]", t),
        (Some(t), false) => format!("  [target {:.3e} not met]", t),
        (None, _) => String::new(),
    };
    match (estimate.mean, estimate.stderr) {
        (Some(mean), Some(stderr)) => {
            format!("  {:<16} {:>14.6e} ± {:.3e}{}", observable, mean, stderr, target)
        }
        (Some(mean), None) => format!("  {:<16} {:>14.6e} ± n/a{}", observable, mean, target),
        _ => format!("  {:<16} no usable samples", observable),
    }
}

fn print_report(report: &MeasurementReport) {
    println!(
        "Measurement {} ({} run(s), {} successful, {:.1}s).",
        report.termination.describe(),
        report.runs,
        report.successful_runs,
        report.elapsed_secs
    );
    for (observable, estimate) in &report.estimates {
        println!("{}", estimate_line(&observable.to_string(), estimate));
    }
}
