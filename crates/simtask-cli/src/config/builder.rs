use super::defaults::DefaultsConfig;
use super::file::{FileConfig, FileValue};
use super::models::{AppConfig, FedPlan, RefinePlan, SweepPlan};
use crate::cli::{FedArgs, JobArgs, MeasureArgs, RefineArgs, SweepArgs};
use crate::error::{CliError, Result};
use simtask::core::control::{ControlInput, InputDeck};
use simtask::core::observable::Observable;
use simtask::engine::config::{Budget, MeasurementConfigBuilder};
use simtask::engine::process::{CarryForward, ProcessEngine};
use simtask::workflows::fed::WindowPartition;
use simtask::workflows::refine::RefineOptions;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub fn build_measure(args: &MeasureArgs) -> Result<AppConfig> {
    let file = load_file(&args.job)?;
    build_app(&args.job, &file, &DefaultsConfig::default())
}

pub fn build_sweep(args: &SweepArgs) -> Result<SweepPlan> {
    let defaults = DefaultsConfig::default();
    let file = load_file(&args.job)?;
    let app = build_app(&args.job, &file, &defaults)?;

    let sweep_file = file.sweep.unwrap_or_default();
    let parameter = args
        .parameter
        .or(sweep_file.parameter)
        .ok_or_else(|| missing("sweep.parameter"))?;
    let raw: Vec<String> = match &args.values {
        Some(values) => values.clone(),
        None => sweep_file
            .values
            .unwrap_or_default()
            .iter()
            .map(FileValue::to_raw)
            .collect(),
    };
    let values = raw
        .iter()
        .map(|r| parameter.parse_value(r))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| CliError::Argument(e.to_string()))?;

    Ok(SweepPlan {
        app,
        parameter,
        values,
    })
}

pub fn build_fed(args: &FedArgs) -> Result<FedPlan> {
    let defaults = DefaultsConfig::default();
    let file = load_file(&args.job)?;
    let app = build_app(&args.job, &file, &defaults)?;

    let fed_file = file.fed.unwrap_or_default();
    let min = args.min.or(fed_file.min).ok_or_else(|| missing("fed.min"))?;
    let max = args.max.or(fed_file.max).ok_or_else(|| missing("fed.max"))?;
    let stride = args
        .stride
        .or(fed_file.stride)
        .ok_or_else(|| missing("fed.stride"))?;
    let bin_width = fed_file.bin_width.unwrap_or(defaults.bin_width);
    let partition = WindowPartition::new(min, max, stride, bin_width)?;

    let final_budget = Budget {
        max_runs: fed_file.final_max_runs.unwrap_or(defaults.final_max_runs),
        max_time: Some(seconds(
            fed_file
                .final_max_time
                .unwrap_or(defaults.final_max_time_secs),
        )?),
    };

    Ok(FedPlan {
        app,
        partition,
        final_budget,
    })
}

pub fn build_refine(args: &RefineArgs) -> Result<RefinePlan> {
    let defaults = DefaultsConfig::default();
    let file = load_file(&args.job)?;
    let app = build_app(&args.job, &file, &defaults)?;

    let refine_file = file.refine.unwrap_or_default();
    let parameter = args
        .parameter
        .or(refine_file.parameter)
        .ok_or_else(|| missing("refine.parameter"))?;
    let observable = args
        .observable
        .clone()
        .or(refine_file.observable)
        .or_else(|| app.measurement.observables.first().cloned())
        .ok_or_else(|| missing("refine.observable"))?;
    let low = args
        .low
        .or(refine_file.low)
        .ok_or_else(|| missing("refine.low"))?;
    let high = args
        .high
        .or(refine_file.high)
        .ok_or_else(|| missing("refine.high"))?;

    let options = RefineOptions {
        low,
        high,
        min_x_spacing: refine_file
            .min_x_spacing
            .unwrap_or(defaults.min_x_spacing),
        min_y_spacing: refine_file
            .min_y_spacing
            .unwrap_or(defaults.min_y_spacing),
        max_points: args
            .max_points
            .or(refine_file.max_points)
            .unwrap_or(defaults.max_points),
    };

    Ok(RefinePlan {
        app,
        parameter,
        observable,
        options,
    })
}

fn load_file(job: &JobArgs) -> Result<FileConfig> {
    let file = FileConfig::from_file(&job.config)?;
    apply_set_values(file, &job.set_values)
}

fn build_app(job: &JobArgs, file: &FileConfig, defaults: &DefaultsConfig) -> Result<AppConfig> {
    let control_path = file.control.as_ref().ok_or_else(|| missing("control"))?;
    let control = ControlInput::load(control_path).map_err(|e| CliError::FileParsing {
        path: control_path.clone(),
        source: e.into(),
    })?;

    let engine_file = file.engine.clone().unwrap_or_default();
    let executable = job
        .engine
        .clone()
        .or(engine_file.executable)
        .ok_or_else(|| missing("engine.executable"))?;
    let mut engine = ProcessEngine::new(executable)
        .with_args(engine_file.args)
        .with_output_file(
            engine_file
                .output_file
                .unwrap_or_else(|| defaults.output_file.clone()),
        );
    if let Some(files) = engine_file.carry_forward {
        engine = engine.with_carry_forward(
            files
                .into_iter()
                .map(|c| CarryForward::new(c.from, c.to))
                .collect(),
        );
    }

    let budget = file.budget.clone().unwrap_or_default();
    let max_runs = job
        .max_runs
        .or(budget.max_runs)
        .unwrap_or(defaults.max_runs);
    let max_time = job.max_time.or(budget.max_time).map(seconds).transpose()?;

    let mut builder = MeasurementConfigBuilder::new()
        .observables(file.observables.iter().cloned())
        .max_runs(max_runs)
        .max_consecutive_failures(
            budget
                .max_consecutive_failures
                .unwrap_or(defaults.max_consecutive_failures),
        )
        .statistics(file.statistics.unwrap_or_default())
        .input(InputDeck::new(control, file.files.clone()));
    if let Some(limit) = max_time {
        builder = builder.max_time(limit);
    }
    for (observable, &max_stderr) in &file.precision {
        builder = builder.precision(observable.clone(), max_stderr);
    }
    let measurement = builder.build()?;
    debug!(
        budget = ?measurement.budget,
        observables = measurement.observables.len(),
        "Built measurement template."
    );

    Ok(AppConfig {
        engine,
        measurement,
        output_dir: job.output.clone(),
    })
}

fn missing(key: &str) -> CliError {
    CliError::Config(format!(
        "`{}` must be given in the job file, with --set, or as a flag",
        key
    ))
}

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CliError::Argument(format!("Invalid time budget: {} s", value)))
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let key = key.trim();

        if let Some(observable) = key.strip_prefix("precision.") {
            let observable: Observable = parse(key, observable)?;
            config.precision.insert(observable, parse(key, value)?);
            continue;
        }

        match key {
            "budget.max-runs" => {
                config.budget.get_or_insert_with(Default::default).max_runs = Some(parse(key, value)?)
            }
            "budget.max-time" => {
                config.budget.get_or_insert_with(Default::default).max_time = Some(parse(key, value)?)
            }
            "budget.max-consecutive-failures" => {
                config
                    .budget
                    .get_or_insert_with(Default::default)
                    .max_consecutive_failures = Some(parse(key, value)?)
            }
            "engine.executable" => {
                config.engine.get_or_insert_with(Default::default).executable =
                    Some(parse(key, value)?)
            }
            "engine.output-file" => {
                config.engine.get_or_insert_with(Default::default).output_file =
                    Some(value.trim().to_string())
            }
            "sweep.parameter" => {
                config.sweep.get_or_insert_with(Default::default).parameter =
                    Some(parse(key, value)?)
            }
            "fed.min" => config.fed.get_or_insert_with(Default::default).min = Some(parse(key, value)?),
            "fed.max" => config.fed.get_or_insert_with(Default::default).max = Some(parse(key, value)?),
            "fed.stride" => {
                config.fed.get_or_insert_with(Default::default).stride = Some(parse(key, value)?)
            }
            "fed.bin-width" => {
                config.fed.get_or_insert_with(Default::default).bin_width =
                    Some(parse(key, value)?)
            }
            "fed.final-max-runs" => {
                config.fed.get_or_insert_with(Default::default).final_max_runs =
                    Some(parse(key, value)?)
            }
            "fed.final-max-time" => {
                config.fed.get_or_insert_with(Default::default).final_max_time =
                    Some(parse(key, value)?)
            }
            "refine.parameter" => {
                config.refine.get_or_insert_with(Default::default).parameter =
                    Some(parse(key, value)?)
            }
            "refine.observable" => {
                config.refine.get_or_insert_with(Default::default).observable =
                    Some(parse(key, value)?)
            }
            "refine.low" => {
                config.refine.get_or_insert_with(Default::default).low = Some(parse(key, value)?)
            }
            "refine.high" => {
                config.refine.get_or_insert_with(Default::default).high = Some(parse(key, value)?)
            }
            "refine.min-x-spacing" => {
                config.refine.get_or_insert_with(Default::default).min_x_spacing =
                    Some(parse(key, value)?)
            }
            "refine.min-y-spacing" => {
                config.refine.get_or_insert_with(Default::default).min_y_spacing =
                    Some(parse(key, value)?)
            }
            "refine.max-points" => {
                config.refine.get_or_insert_with(Default::default).max_points =
                    Some(parse(key, value)?)
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}
