use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ObservableParseError {
    #[error("Observable specification is empty")]
    Empty,
    #[error("Invalid index '{index}' in observable specification '{spec}'")]
    InvalidIndex { spec: String, index: String },
}

/// A named scalar reported periodically by the engine.
///
/// The optional index path selects one element of an array-valued field, so
/// `nmol.0` is the first entry of the `nmol` array in every output frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Observable {
    name: String,
    index: Vec<usize>,
}

impl Observable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: Vec::new(),
        }
    }

    pub fn indexed(name: impl Into<String>, index: impl IntoIterator<Item = usize>) -> Self {
        Self {
            name: name.into(),
            index: index.into_iter().collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &[usize] {
        &self.index
    }

    /// File-system friendly label, e.g. `nmol_0`.
    pub fn label(&self) -> String {
        let mut label = self.name.clone();
        for i in &self.index {
            label.push('_');
            label.push_str(&i.to_string());
        }
        label
    }
}

impl fmt::Display for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        for i in &self.index {
            write!(f, ".{}", i)?;
        }
        Ok(())
    }
}

impl FromStr for Observable {
    type Err = ObservableParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let name = parts.next().unwrap_or("").trim();
        if name.is_empty() {
            return Err(ObservableParseError::Empty);
        }
        let index = parts
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .map_err(|_| ObservableParseError::InvalidIndex {
                        spec: s.to_string(),
                        index: p.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::indexed(name, index))
    }
}

impl TryFrom<String> for Observable {
    type Error = ObservableParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Observable> for String {
    fn from(value: Observable) -> Self {
        value.to_string()
    }
}

/// Samples of one observable accumulated across sequential, resumed runs.
///
/// Each run's series is appended exactly once; run boundaries are kept so the
/// contribution of every run can be reported without re-reading its output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedSeries {
    samples: Vec<f64>,
    boundaries: Vec<RunSpan>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpan {
    pub run: usize,
    pub start: usize,
    pub len: usize,
}

impl MergedSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend_run(&mut self, run: usize, samples: &[f64]) {
        self.boundaries.push(RunSpan {
            run,
            start: self.samples.len(),
            len: samples.len(),
        });
        self.samples.extend_from_slice(samples);
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn spans(&self) -> &[RunSpan] {
        &self.boundaries
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn contributing_runs(&self) -> usize {
        self.boundaries.iter().filter(|s| s.len > 0).count()
    }
}
