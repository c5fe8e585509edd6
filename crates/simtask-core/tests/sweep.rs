mod common;

use common::{SyntheticEngine, deck, energy, quiet};
use simtask::core::control::{ParameterName, ParameterValue};
use simtask::engine::config::{ConfigError, MeasurementConfig, MeasurementConfigBuilder};
use simtask::engine::context::RunContext;
use simtask::engine::state::Termination;
use simtask::workflows::refine::{AdaptiveSweep, RefineOptions};
use simtask::workflows::sweep::{MeasurementSweep, SWEEP_REPORT_FILE, SweepReport};
use tempfile::tempdir;

fn template(max_runs: usize) -> MeasurementConfig {
    MeasurementConfigBuilder::new()
        .observable(energy())
        .max_runs(max_runs)
        .input(deck())
        .build()
        .unwrap()
}

fn temperatures(values: &[f64]) -> Vec<ParameterValue> {
    values.iter().copied().map(ParameterValue::Temperature).collect()
}

#[test]
fn values_never_observe_each_others_amendments() {
    let dir = tempdir().unwrap();
    let sweep = MeasurementSweep::new(
        &template(2),
        ParameterName::Temperature,
        temperatures(&[100.0, 200.0, 300.0]),
        dir.path(),
    )
    .unwrap();
    let engine = SyntheticEngine::new(1, 50);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = sweep.run(&ctx).unwrap();

    let seen = engine.seen();
    assert_eq!(seen.len(), 6);
    for run in &seen {
        let value_dir = run.dir.parent().unwrap().file_name().unwrap();
        let expected = format!("param_{}", run.control.main.temperature);
        assert_eq!(value_dir.to_string_lossy(), expected);
        if let Some(prior) = &run.prior {
            assert_eq!(prior.parent(), run.dir.parent());
        }
    }

    let rows = report.rows(&energy());
    assert_eq!(rows.len(), 3);
    for (row, expected) in rows.iter().zip([1.0, 2.0, 3.0]) {
        assert!((row.mean - expected).abs() < 0.2, "{:?}", row);
    }
}

#[test]
fn value_without_data_is_omitted_but_sweep_continues() {
    let dir = tempdir().unwrap();
    let sweep = MeasurementSweep::new(
        &template(2),
        ParameterName::Temperature,
        temperatures(&[100.0, 200.0, 300.0]),
        dir.path(),
    )
    .unwrap();
    let engine = SyntheticEngine::new(2, 50).silent_at(&[200.0]);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = sweep.run(&ctx).unwrap();

    let silent = report
        .entry(&ParameterValue::Temperature(200.0))
        .and_then(|e| e.report())
        .unwrap();
    assert_eq!(silent.missing, vec![energy()]);
    assert_eq!(silent.mean(&energy()), None);

    let values: Vec<String> = report.rows(&energy()).into_iter().map(|r| r.value).collect();
    assert_eq!(values, vec!["100", "300"]);

    let table = std::fs::read_to_string(dir.path().join("energy_sweep.csv")).unwrap();
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines[0], "value,mean,stderr");
    assert_eq!(lines.len(), 3);

    let persisted: SweepReport =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join(SWEEP_REPORT_FILE)).unwrap())
            .unwrap();
    assert_eq!(persisted, report);
}

#[test]
fn failing_value_aborts_alone() {
    let dir = tempdir().unwrap();
    let sweep = MeasurementSweep::new(
        &template(3),
        ParameterName::Temperature,
        temperatures(&[100.0, 200.0]),
        dir.path(),
    )
    .unwrap();
    let engine = SyntheticEngine::new(3, 30).failing_at(&[100.0]);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = sweep.run(&ctx).unwrap();

    let failed = report.entries[0].report().unwrap();
    assert!(matches!(failed.termination, Termination::Aborted { .. }));
    let healthy = report.entries[1].report().unwrap();
    assert_eq!(healthy.successful_runs, 3);
    assert_eq!(report.rows(&energy()).len(), 1);
}

#[test]
fn invalid_amendment_fails_before_any_run() {
    let mut no_insertions = deck();
    no_insertions.control.main.moves.retain(|m| {
        !matches!(m, simtask::core::control::MoveSpec::InsertMolecule { .. })
    });
    let template = template(2).with_input(no_insertions);

    let result = MeasurementSweep::new(
        &template,
        ParameterName::MolChemPot,
        vec![ParameterValue::MolChemPot(1e-6)],
        "unused",
    );
    assert!(matches!(result, Err(ConfigError::Control(_))));
}

#[test]
fn rerunning_a_sweep_reuses_finished_measurements() {
    let dir = tempdir().unwrap();
    let sweep = MeasurementSweep::new(
        &template(2),
        ParameterName::Temperature,
        temperatures(&[150.0, 250.0]),
        dir.path(),
    )
    .unwrap();
    let reporter = quiet();

    let engine = SyntheticEngine::new(4, 20);
    let first = sweep.run(&RunContext::new(&engine, &reporter)).unwrap();
    let idle = SyntheticEngine::new(4, 20);
    let second = sweep.run(&RunContext::new(&idle, &reporter)).unwrap();

    assert_eq!(idle.calls(), 0);
    assert_eq!(first, second);
}

#[test]
fn adaptive_sweep_refines_where_the_observable_changes() {
    let dir = tempdir().unwrap();
    let options = RefineOptions {
        min_x_spacing: 0.2,
        min_y_spacing: 0.3,
        max_points: 10,
        ..RefineOptions::new(100.0, 500.0)
    };
    let sweep = AdaptiveSweep::new(
        &template(2),
        ParameterName::Temperature,
        energy(),
        options,
        dir.path(),
    )
    .unwrap();
    let engine = SyntheticEngine::new(6, 200);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = sweep.run(&ctx).unwrap();

    let xs: Vec<f64> = report.entries.iter().map(|e| e.value.coordinate()).collect();
    assert!(xs.windows(2).all(|w| w[0] < w[1]), "{:?}", xs);
    assert_eq!(xs.first(), Some(&100.0));
    assert_eq!(xs.last(), Some(&500.0));
    assert!(xs.contains(&300.0));
    assert!(xs.len() <= 10);
    // Linear response: halves narrower than 20% of the range are never split.
    assert!(xs.windows(2).all(|w| (w[1] - w[0]) >= 0.2 * 400.0 / 2.0));
    assert!(dir.path().join("energy_sweep.csv").exists());
}

#[test]
fn sweep_values_run_one_after_another() {
    let dir = tempdir().unwrap();
    let sweep = MeasurementSweep::new(
        &template(2),
        ParameterName::Temperature,
        temperatures(&[100.0, 200.0, 300.0, 400.0]),
        dir.path(),
    )
    .unwrap();
    let engine = SyntheticEngine::new(5, 20).taking(std::time::Duration::from_millis(20));
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    // The CLI runs sweeps on a single worker unless asked for more.
    #[cfg(feature = "parallel")]
    let report = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| sweep.run(&ctx))
        .unwrap();
    #[cfg(not(feature = "parallel"))]
    let report = sweep.run(&ctx).unwrap();

    assert_eq!(engine.calls(), 8);
    assert_eq!(engine.peak_concurrency(), 1);
    let order: Vec<f64> = engine
        .seen()
        .iter()
        .map(|s| s.control.main.temperature)
        .collect();
    assert_eq!(order, vec![100.0, 100.0, 200.0, 200.0, 300.0, 300.0, 400.0, 400.0]);
    assert_eq!(report.entries.len(), 4);
}
