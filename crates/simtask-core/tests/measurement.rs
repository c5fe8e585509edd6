mod common;

use common::{SyntheticEngine, deck, energy, quiet};
use simtask::engine::config::MeasurementConfigBuilder;
use simtask::engine::context::RunContext;
use simtask::engine::measurement::{LEDGER_FILE, Measurement, REPORT_FILE};
use simtask::engine::state::{MeasurementState, Termination};
use tempfile::tempdir;

#[test]
fn converges_to_target_with_generous_budget() {
    let dir = tempdir().unwrap();
    let config = MeasurementConfigBuilder::new()
        .observable(energy())
        .precision(energy(), 0.05)
        .max_runs(50)
        .input(deck())
        .build()
        .unwrap();
    let engine = SyntheticEngine::new(11, 100);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let mut measurement = Measurement::open(config, dir.path()).unwrap();
    let report = measurement.run(&ctx).unwrap().clone();

    assert_eq!(report.state, MeasurementState::Converged);
    assert_eq!(report.termination, Termination::Converged);
    let stderr = report.stderr(&energy()).unwrap();
    let mean = report.mean(&energy()).unwrap();
    assert!(stderr <= 0.05);
    assert!((mean - 0.77).abs() < 5.0 * stderr, "mean {} far from 0.77", mean);
    assert!(report.runs > 1, "one run of 100 samples cannot reach the target");
    assert_eq!(engine.calls(), report.runs);

    for k in 1..=report.runs {
        assert!(dir.path().join(format!("sim_{}", k)).join("CONTROL").exists());
    }
    assert!(dir.path().join(LEDGER_FILE).exists());
    assert!(dir.path().join(REPORT_FILE).exists());
}

#[test]
fn single_run_budget_terminates_exhausted() {
    let dir = tempdir().unwrap();
    let config = MeasurementConfigBuilder::new()
        .observable(energy())
        .precision(energy(), 1e-4)
        .max_runs(1)
        .input(deck())
        .build()
        .unwrap();
    let engine = SyntheticEngine::new(3, 100);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let mut measurement = Measurement::open(config, dir.path()).unwrap();
    let report = measurement.run(&ctx).unwrap();

    assert_eq!(report.state, MeasurementState::Exhausted);
    assert_eq!(report.runs, 1);
    assert!(matches!(
        report.termination,
        Termination::BudgetExhausted {
            runs: 1,
            last_error: None,
            ..
        }
    ));
    assert!(!report.estimates[&energy()].target_met);
}

#[test]
fn systematic_launch_failure_trips_circuit_breaker() {
    let dir = tempdir().unwrap();
    let config = MeasurementConfigBuilder::new()
        .observable(energy())
        .precision(energy(), 0.05)
        .max_runs(50)
        .input(deck())
        .build()
        .unwrap();
    let engine = SyntheticEngine::new(5, 100).failing_at(&[77.0]);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let mut measurement = Measurement::open(config, dir.path()).unwrap();
    let report = measurement.run(&ctx).unwrap();

    assert_eq!(report.state, MeasurementState::Exhausted);
    assert_eq!(report.runs, 3);
    assert!(matches!(
        report.termination,
        Termination::Aborted {
            consecutive_failures: 3,
            ..
        }
    ));
    assert_eq!(report.missing, vec![energy()]);
    assert!(report.termination.describe().contains("status 1"));
}

#[test]
fn finished_measurement_is_resumed_without_new_runs() {
    let dir = tempdir().unwrap();
    let config = MeasurementConfigBuilder::new()
        .observable(energy())
        .max_runs(3)
        .input(deck())
        .build()
        .unwrap();
    let reporter = quiet();

    let engine = SyntheticEngine::new(8, 50);
    let first = {
        let ctx = RunContext::new(&engine, &reporter);
        let mut measurement = Measurement::open(config.clone(), dir.path()).unwrap();
        measurement.run(&ctx).unwrap().clone()
    };
    assert_eq!(engine.calls(), 3);

    let idle = SyntheticEngine::new(8, 50);
    let ctx = RunContext::new(&idle, &reporter);
    let mut reopened = Measurement::open(config, dir.path()).unwrap();
    assert_eq!(reopened.state(), MeasurementState::Exhausted);
    let second = reopened.run(&ctx).unwrap();

    assert_eq!(idle.calls(), 0);
    assert_eq!(*second, first);
    assert_eq!(reopened.ledger().series[&energy()].len(), 150);
    assert_eq!(reopened.ledger().series[&energy()].contributing_runs(), 3);
}

#[test]
fn every_resumed_run_continues_the_previous_one() {
    let dir = tempdir().unwrap();
    let config = MeasurementConfigBuilder::new()
        .observable(energy())
        .max_runs(4)
        .input(deck())
        .build()
        .unwrap();
    let engine = SyntheticEngine::new(2, 20);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    Measurement::open(config, dir.path())
        .unwrap()
        .run(&ctx)
        .unwrap();

    let seen = engine.seen();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0].prior, None);
    for pair in seen.windows(2) {
        assert_eq!(pair[1].prior.as_ref(), Some(&pair[0].dir));
    }
}

#[test]
fn stderr_shrinks_with_more_runs_on_average() {
    const SEEDS: u64 = 20;
    const RUNS: usize = 6;
    let reporter = quiet();
    let mut totals = vec![0.0; RUNS];

    for seed in 0..SEEDS {
        let dir = tempdir().unwrap();
        let config = MeasurementConfigBuilder::new()
            .observable(energy())
            .max_runs(RUNS)
            .input(deck())
            .build()
            .unwrap();
        let engine = SyntheticEngine::new(seed, 40);
        let ctx = RunContext::new(&engine, &reporter);
        let mut measurement = Measurement::open(config, dir.path()).unwrap();
        measurement.run(&ctx).unwrap();

        let history = &measurement.ledger().history[&energy()];
        assert_eq!(history.len(), RUNS);
        for (k, point) in history.iter().enumerate() {
            totals[k] += point.stderr.unwrap();
        }
    }

    let averages: Vec<f64> = totals.iter().map(|t| t / SEEDS as f64).collect();
    for pair in averages.windows(2) {
        assert!(
            pair[1] <= pair[0] * 1.1,
            "average stderr grew: {:?}",
            averages
        );
    }
    assert!(averages[RUNS - 1] < 0.6 * averages[0]);
}
