use crate::core::observable::Observable;
use serde::Deserialize;
use serde_yaml::Value;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Periodic output contains no sample frames")]
    Empty,
    #[error("Frame {frame} has no field '{field}'")]
    MissingField { field: String, frame: usize },
    #[error("Frame {frame}: index {index} is out of range for field '{field}'")]
    IndexOutOfRange {
        field: String,
        index: usize,
        frame: usize,
    },
    #[error("Frame {frame}: value of '{field}' is not a finite number")]
    NonNumeric { field: String, frame: usize },
    #[error("Output '{path}' could not be read: {reason}")]
    Unreadable { path: String, reason: String },
}

/// The engine's periodic output stream: one mapping per sampling frame.
///
/// Both layouts the engine has used are accepted: a stream of YAML documents
/// separated by `---`, and a single document holding a sequence of mappings.
#[derive(Debug, Clone, Default)]
pub struct PeriodicOutput {
    frames: Vec<Value>,
}

impl PeriodicOutput {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut frames = Vec::new();
        for document in serde_yaml::Deserializer::from_str(text) {
            match Value::deserialize(document)? {
                Value::Null => {}
                Value::Sequence(items) => frames.extend(items),
                frame => frames.push(frame),
            }
        }
        if frames.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(Self { frames })
    }

    pub fn read(path: &Path) -> Result<Self, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::parse(&text)
    }

    pub fn frames(&self) -> usize {
        self.frames.len()
    }

    /// Extracts the ordered samples of `observable`, one per frame.
    ///
    /// A frame that lacks the field or holds a non-numeric or non-finite value
    /// fails the whole series; partial series are never returned.
    pub fn series(&self, observable: &Observable) -> Result<Vec<f64>, ParseError> {
        let field = observable.name();
        self.frames
            .iter()
            .enumerate()
            .map(|(frame, value)| {
                let mut current = value.get(field).ok_or_else(|| ParseError::MissingField {
                    field: field.to_string(),
                    frame,
                })?;
                for &index in observable.index() {
                    current = current.get(index).ok_or_else(|| ParseError::IndexOutOfRange {
                        field: observable.to_string(),
                        index,
                        frame,
                    })?;
                }
                current
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| ParseError::NonNumeric {
                        field: observable.to_string(),
                        frame,
                    })
            })
            .collect()
    }
}
