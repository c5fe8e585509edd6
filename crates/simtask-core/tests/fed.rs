mod common;

use common::{SyntheticEngine, deck, fedbias, quiet};
use simtask::core::control::{BinGrid, FedMode, OrderWindow, ParameterValue};
use simtask::core::io::tmatrix::TransitionMatrix;
use simtask::engine::config::{Budget, ConfigError, MeasurementConfig, MeasurementConfigBuilder};
use simtask::engine::context::RunContext;
use simtask::workflows::fed::{
    COMBINED_MATRIX_FILE, FED_REPORT_FILE, FINAL_RUN_DIR, FedReport, FedSweep, FedWindow,
    WindowPartition,
};
use std::time::Duration;
use tempfile::tempdir;

fn template() -> MeasurementConfig {
    MeasurementConfigBuilder::new()
        .observable(fedbias())
        .precision(fedbias(), 1.0)
        .max_runs(2)
        .max_time(Duration::from_secs(3600))
        .input(deck())
        .build()
        .unwrap()
}

#[test]
fn three_windows_combine_into_the_element_wise_sum() {
    let dir = tempdir().unwrap();
    let partition = WindowPartition::new(0, 29, 10, 1.0).unwrap();
    assert_eq!(
        partition.windows(),
        &[
            OrderWindow { lo: -0.5, hi: 10.5 },
            OrderWindow { lo: 9.5, hi: 20.5 },
            OrderWindow { lo: 19.5, hi: 29.5 },
        ]
    );
    let fed = FedSweep::new(&template(), partition, dir.path())
        .unwrap()
        .with_final_budget(Budget {
            max_runs: 1,
            max_time: Some(Duration::from_secs(60)),
        });
    let engine = SyntheticEngine::new(9, 50);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = fed.run(&ctx).unwrap();

    let combined = TransitionMatrix::read_from_path(&dir.path().join(COMBINED_MATRIX_FILE)).unwrap();
    assert_eq!(combined.shape(), (30, 4));
    for (bin, row) in combined.rows().iter().enumerate() {
        let expected = match bin {
            10 | 20 => 2.0,
            _ => 1.0,
        };
        assert!(row.iter().all(|&v| v == expected), "bin {}: {:?}", bin, row);
    }
    assert_eq!(report.combined_matrix, dir.path().join(COMBINED_MATRIX_FILE));
    assert_eq!(report.windows.entries.len(), 3);

    let final_runs: Vec<_> = engine
        .seen()
        .into_iter()
        .filter(|s| s.dir.starts_with(dir.path().join(FINAL_RUN_DIR)))
        .collect();
    assert_eq!(final_runs.len(), 1);
    let block = final_runs[0].control.fed().unwrap();
    assert_eq!(block.method.mode(), FedMode::Resume);
    assert_eq!(block.order_parameter.window, None);
    assert!(final_runs[0].dir.join(COMBINED_MATRIX_FILE).exists());
    assert_eq!(report.final_run.runs, 1);
}

#[test]
fn window_runs_start_fresh_and_resume_within_their_window() {
    let dir = tempdir().unwrap();
    // Without precision targets every window spends its whole run budget.
    let template = MeasurementConfigBuilder::new()
        .observable(fedbias())
        .max_runs(2)
        .max_time(Duration::from_secs(3600))
        .input(deck())
        .build()
        .unwrap();
    let partition = WindowPartition::new(0, 29, 10, 1.0).unwrap();
    let fed = FedSweep::new(&template, partition, dir.path())
        .unwrap()
        .with_final_budget(Budget {
            max_runs: 1,
            max_time: None,
        });
    let engine = SyntheticEngine::new(10, 50);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    fed.run(&ctx).unwrap();

    let window_runs: Vec<_> = engine
        .seen()
        .into_iter()
        .filter(|s| !s.dir.starts_with(dir.path().join(FINAL_RUN_DIR)))
        .collect();
    assert_eq!(window_runs.len(), 6);
    for run in window_runs {
        let block = run.control.fed().unwrap();
        assert_eq!(block.method.mode(), FedMode::New);
        assert!(block.order_parameter.window.is_some());
        let control = std::fs::read_to_string(run.dir.join("CONTROL")).unwrap();
        match &run.prior {
            Some(prior) => {
                assert_eq!(prior.parent(), run.dir.parent());
                assert!(control.contains("fed method tm 1000 10 res tri"));
            }
            None => assert!(control.contains("fed method tm 1000 10 new tri")),
        }
    }
}

#[test]
fn misaligned_window_is_rejected_before_any_run() {
    let grid = BinGrid {
        ngrid: 30,
        xmin: -0.5,
        xmax: 29.5,
    };
    let wide_bins = BinGrid {
        ngrid: 15,
        xmin: -0.5,
        xmax: 29.5,
    };
    let result = WindowPartition::from_windows(
        grid,
        vec![
            FedWindow {
                window: OrderWindow { lo: -0.5, hi: 10.5 },
                grid,
            },
            FedWindow {
                window: OrderWindow { lo: 9.5, hi: 20.5 },
                grid: wide_bins,
            },
            FedWindow {
                window: OrderWindow { lo: 19.5, hi: 29.5 },
                grid,
            },
        ],
    );

    assert!(matches!(result, Err(ConfigError::InconsistentBins { .. })));
}

#[test]
fn template_without_fed_block_is_a_configuration_error() {
    let mut plain = deck();
    plain.control.use_block.fed = None;
    let template = template().with_input(plain);
    let partition = WindowPartition::new(0, 29, 10, 1.0).unwrap();

    let result = FedSweep::new(&template, partition, "unused");
    assert!(matches!(result, Err(ConfigError::Control(_))));
}

#[test]
fn window_without_successful_runs_is_recorded_in_the_report() {
    let dir = tempdir().unwrap();
    let partition = WindowPartition::new(0, 29, 10, 1.0).unwrap();
    let fed = FedSweep::new(&template(), partition, dir.path())
        .unwrap()
        .with_final_budget(Budget {
            max_runs: 1,
            max_time: Some(Duration::from_secs(60)),
        });
    let engine = SyntheticEngine::new(11, 50).failing_windows_at(&[9.5]);
    let reporter = quiet();
    let ctx = RunContext::new(&engine, &reporter);

    let report = fed.run(&ctx).unwrap();

    let gap = ParameterValue::Window(OrderWindow { lo: 9.5, hi: 20.5 });
    assert_eq!(report.skipped_windows, vec![gap]);
    let combined = TransitionMatrix::read_from_path(&report.combined_matrix).unwrap();
    assert!(combined.rows()[15].iter().all(|&v| v == 0.0));
    assert_eq!(report.final_run.runs, 1);

    let text = std::fs::read_to_string(dir.path().join(FED_REPORT_FILE)).unwrap();
    let written: FedReport = serde_json::from_str(&text).unwrap();
    assert_eq!(written.skipped_windows, vec![gap]);
}
