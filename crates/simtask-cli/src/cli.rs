use clap::{Args, Parser, Subcommand};
use simtask::core::control::ParameterName;
use simtask::core::observable::Observable;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "simtask - run an external Monte Carlo engine until its observables reach a target precision, across single measurements, parameter sweeps and free-energy windows.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Number of sweep values or windows measured concurrently.
    /// Values are measured one at a time unless a larger count is given.
    #[arg(
        short = 'j',
        long,
        global = true,
        value_name = "NUM",
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    pub threads: usize,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Repeat engine runs in one directory until the precision targets are met.
    Measure(MeasureArgs),
    /// Run one independent measurement per value of a control parameter.
    Sweep(SweepArgs),
    /// Sample an order parameter in windows and combine their transition matrices.
    Fed(FedArgs),
    /// Place sweep points adaptively where an observable changes fastest.
    Refine(RefineArgs),
}

/// Arguments shared by every job-running subcommand.
#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    /// Path to the job file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Directory receiving run directories, ledgers and reports.
    #[arg(short, long, required = true, value_name = "DIR")]
    pub output: PathBuf,

    /// Override the engine executable from the job file.
    #[arg(short, long, value_name = "PATH")]
    pub engine: Option<PathBuf>,

    /// Override the maximum number of engine runs per measurement.
    #[arg(long, value_name = "INT")]
    pub max_runs: Option<usize>,

    /// Override the wall-time budget per measurement, in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub max_time: Option<f64>,

    /// Set a specific configuration value, overriding the job file.
    /// Can be used multiple times. Example: -S budget.max-runs=40
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `measure` subcommand.
#[derive(Args, Debug)]
pub struct MeasureArgs {
    #[command(flatten)]
    pub job: JobArgs,
}

/// Arguments for the `sweep` subcommand.
#[derive(Args, Debug)]
pub struct SweepArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Override the swept parameter (temperature, molchempot, steps, orderparam).
    #[arg(short, long, value_name = "NAME")]
    pub parameter: Option<ParameterName>,

    /// Override the swept values. Order-parameter windows are written `lo:hi`.
    #[arg(long, value_name = "VALUE", value_delimiter = ',', num_args(1..))]
    pub values: Option<Vec<String>>,
}

/// Arguments for the `fed` subcommand.
#[derive(Args, Debug)]
pub struct FedArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Override the lowest order-parameter value covered.
    #[arg(long, value_name = "INT", allow_hyphen_values = true)]
    pub min: Option<i64>,

    /// Override the highest order-parameter value covered.
    #[arg(long, value_name = "INT", allow_hyphen_values = true)]
    pub max: Option<i64>,

    /// Override the width of each window, in order-parameter units.
    #[arg(long, value_name = "INT")]
    pub stride: Option<i64>,
}

/// Arguments for the `refine` subcommand.
#[derive(Args, Debug)]
pub struct RefineArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Override the refined parameter.
    #[arg(short, long, value_name = "NAME")]
    pub parameter: Option<ParameterName>,

    /// Override the observable whose change drives the refinement.
    #[arg(long, value_name = "OBSERVABLE")]
    pub observable: Option<Observable>,

    /// Override the lower end of the parameter range.
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub low: Option<f64>,

    /// Override the upper end of the parameter range.
    #[arg(long, value_name = "FLOAT", allow_hyphen_values = true)]
    pub high: Option<f64>,

    /// Override the maximum number of measured points.
    #[arg(long, value_name = "INT")]
    pub max_points: Option<usize>,
}
