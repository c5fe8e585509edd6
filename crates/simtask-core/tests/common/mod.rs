#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use simtask::core::control::{ControlInput, InputDeck, OrderWindow};
use simtask::core::io::tmatrix::TransitionMatrix;
use simtask::core::io::yamldata::ParseError;
use simtask::core::observable::Observable;
use simtask::engine::error::EngineError;
use simtask::engine::interface::{Engine, RunHandle};
use simtask::engine::process::stage_input;
use simtask::engine::progress::ProgressReporter;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const CONTROL_TOML: &str = r#"
title = "Synthetic engine test"

[use]
gaspressure = true

[use.fed.method]
type = "transition-matrix"
nout = 1000
n-upd = 10
mode = "new"
tri = true

[use.fed.order-parameter]
name = "nmols"
ngrid = 30
xmin = -0.5
xmax = 29.5

[main]
temperature = 77.0
steps = 1000
yamldata = 10
seeds = [1, 2, 3, 4]

[[main.moves]]
type = "insert-molecule"
pfreq = 50
rmin = 0.7
molecule = "Nitrogen"
molpot = 5e-7

[[main.moves]]
type = "molecule"
pfreq = 50
molecule = "Nitrogen"
"#;

pub fn control() -> ControlInput {
    toml::from_str(CONTROL_TOML).unwrap()
}

pub fn deck() -> InputDeck {
    InputDeck::new(control(), Vec::new())
}

pub fn energy() -> Observable {
    Observable::new("energy")
}

pub fn fedbias() -> Observable {
    Observable::new("fedbias")
}

/// What the engine saw when asked to run in a given directory.
#[derive(Debug, Clone)]
pub struct SeenRun {
    pub dir: PathBuf,
    pub prior: Option<PathBuf>,
    pub control: ControlInput,
}

/// In-process stand-in for the simulation engine.
///
/// `energy` samples are i.i.d. uniform noise on `[-1, 1]` around
/// `temperature / 100`; `fedbias` is the same noise around zero. Runs inside an
/// order-parameter window leave a `TMATRX.000` with a unit entry for every bin
/// whose centre lies inside the window.
pub struct SyntheticEngine {
    seed: u64,
    samples_per_run: usize,
    failing_temperatures: Vec<f64>,
    silent_temperatures: Vec<f64>,
    failing_windows: Vec<f64>,
    run_time: Duration,
    active: AtomicUsize,
    peak: AtomicUsize,
    outputs: Mutex<HashMap<PathBuf, Vec<f64>>>,
    seen: Mutex<Vec<SeenRun>>,
}

impl SyntheticEngine {
    pub fn new(seed: u64, samples_per_run: usize) -> Self {
        Self {
            seed,
            samples_per_run,
            failing_temperatures: Vec::new(),
            silent_temperatures: Vec::new(),
            failing_windows: Vec::new(),
            run_time: Duration::ZERO,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            outputs: Mutex::new(HashMap::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Launches at these temperatures fail.
    pub fn failing_at(mut self, temperatures: &[f64]) -> Self {
        self.failing_temperatures = temperatures.to_vec();
        self
    }

    /// Runs at these temperatures succeed but leave no parsable output.
    pub fn silent_at(mut self, temperatures: &[f64]) -> Self {
        self.silent_temperatures = temperatures.to_vec();
        self
    }

    /// Launches inside order-parameter windows starting at these values fail.
    pub fn failing_windows_at(mut self, lows: &[f64]) -> Self {
        self.failing_windows = lows.to_vec();
        self
    }

    /// Every launch takes at least this long.
    pub fn taking(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    /// Largest number of launches that were in progress at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRun> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Streams depend only on the seed and the call order, so sequential
    /// tests are reproducible.
    fn rng_for(&self, call: usize) -> StdRng {
        StdRng::seed_from_u64(self.seed.wrapping_mul(1_000_003).wrapping_add(call as u64))
    }

    fn write_window_matrix(control: &ControlInput, dir: &Path) {
        let Some(fed) = control.fed() else {
            return;
        };
        let grid = fed.order_parameter.grid;
        let window = fed.order_parameter.window.unwrap_or(OrderWindow {
            lo: grid.xmin,
            hi: grid.xmax,
        });
        let rows = (0..grid.ngrid)
            .map(|bin| {
                let centre = grid.xmin + (bin as f64 + 0.5) * grid.bin_width();
                let inside = centre > window.lo && centre < window.hi;
                vec![if inside { 1.0 } else { 0.0 }; 4]
            })
            .collect();
        TransitionMatrix::from_rows(rows)
            .unwrap()
            .write_to_path(&dir.join("TMATRX.000"))
            .unwrap();
    }

    fn launch(
        &self,
        deck: &InputDeck,
        working_dir: &Path,
        prior: Option<&RunHandle>,
    ) -> Result<RunHandle, EngineError> {
        stage_input(deck, working_dir, prior, &[])?;
        let call = {
            let mut seen = self.seen.lock().unwrap();
            seen.push(SeenRun {
                dir: working_dir.to_path_buf(),
                prior: prior.map(|p| p.dir.clone()),
                control: deck.control.clone(),
            });
            seen.len()
        };

        let temperature = deck.control.main.temperature;
        let window_low = deck
            .control
            .fed()
            .and_then(|fed| fed.order_parameter.window)
            .map(|w| w.lo);
        if self.failing_temperatures.contains(&temperature)
            || window_low.is_some_and(|lo| self.failing_windows.contains(&lo))
        {
            return Err(EngineError::RunFailed {
                dir: working_dir.to_string_lossy().to_string(),
                reason: "engine exited with status 1".into(),
            });
        }

        Self::write_window_matrix(&deck.control, working_dir);
        if !self.silent_temperatures.contains(&temperature) {
            let mut rng = self.rng_for(call);
            let noise: Vec<f64> = (0..self.samples_per_run)
                .map(|_| rng.gen_range(-1.0..=1.0))
                .collect();
            self.outputs
                .lock()
                .unwrap()
                .insert(working_dir.to_path_buf(), noise);
        }
        Ok(RunHandle::new(working_dir))
    }
}

impl Engine for SyntheticEngine {
    fn start_or_resume(
        &self,
        deck: &InputDeck,
        working_dir: &Path,
        prior: Option<&RunHandle>,
    ) -> Result<RunHandle, EngineError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        std::thread::sleep(self.run_time);
        let result = self.launch(deck, working_dir, prior);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn read_observables(
        &self,
        run: &RunHandle,
        observables: &[Observable],
    ) -> BTreeMap<Observable, Result<Vec<f64>, ParseError>> {
        let outputs = self.outputs.lock().unwrap();
        let seen = self.seen.lock().unwrap();
        let temperature = seen
            .iter()
            .rev()
            .find(|s| s.dir == run.dir)
            .map(|s| s.control.main.temperature)
            .unwrap_or_default();

        observables
            .iter()
            .map(|o| {
                let offset = match o.name() {
                    "energy" => Some(temperature / 100.0),
                    "fedbias" => Some(0.0),
                    _ => None,
                };
                let series = match (offset, outputs.get(&run.dir)) {
                    (Some(offset), Some(noise)) => Ok(noise.iter().map(|x| x + offset).collect()),
                    (_, None) => Err(ParseError::Empty),
                    (None, Some(_)) => Err(ParseError::MissingField {
                        field: o.name().to_string(),
                        frame: 0,
                    }),
                };
                (o.clone(), series)
            })
            .collect()
    }
}

pub fn quiet() -> ProgressReporter<'static> {
    ProgressReporter::new()
}
