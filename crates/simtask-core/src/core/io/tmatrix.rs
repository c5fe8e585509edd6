use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

const HEADER: [&str; 2] = ["# Combined transition matrix", "# Tridiagonal format"];
const FIELD_WIDTH: usize = 23;
const FIELD_SEPARATOR: &str = "    ";

#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("File I/O error for '{path}': {source}")]
    Io { path: String, source: io::Error },
    #[error("I/O error: {0}")]
    Stream(#[from] io::Error),
    #[error("Invalid number '{value}' on line {line}")]
    InvalidNumber { line: usize, value: String },
    #[error("Line {line} has {found} columns, expected {expected}")]
    RaggedRow {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("Matrix shape {found:?} does not match {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("No matrices to combine")]
    NothingToCombine,
}

/// Transition counts indexed by order-parameter bin, one row per bin.
///
/// In tridiagonal form each row holds the band entries for its bin, so every
/// row has the same width regardless of the grid size.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransitionMatrix {
    rows: Vec<Vec<f64>>,
}

impl TransitionMatrix {
    pub fn zeros(bins: usize, width: usize) -> Self {
        Self {
            rows: vec![vec![0.0; width]; bins],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let width = rows.first().map_or(0, Vec::len);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(MatrixError::RaggedRow {
                    line: i + 1,
                    expected: width,
                    found: row.len(),
                });
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len(), self.rows.first().map_or(0, Vec::len))
    }

    /// Reads a matrix in the engine's text layout: two header lines followed by
    /// one whitespace-separated row per bin. Blank lines are ignored.
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, MatrixError> {
        let mut rows = Vec::new();
        let mut width = None;
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if i < HEADER.len() || line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(|field| {
                    field.parse::<f64>().map_err(|_| MatrixError::InvalidNumber {
                        line: i + 1,
                        value: field.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let expected = *width.get_or_insert(row.len());
            if row.len() != expected {
                return Err(MatrixError::RaggedRow {
                    line: i + 1,
                    expected,
                    found: row.len(),
                });
            }
            rows.push(row);
        }
        Ok(Self { rows })
    }

    pub fn read_from_path(path: &Path) -> Result<Self, MatrixError> {
        let file = File::open(path).map_err(|e| MatrixError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        Self::read_from(&mut BufReader::new(file))
    }

    pub fn write_to(&self, writer: &mut impl Write) -> Result<(), MatrixError> {
        for line in HEADER {
            writeln!(writer, "{}", line)?;
        }
        for row in &self.rows {
            let fields: Vec<String> = row.iter().map(|v| format_field(*v)).collect();
            writeln!(writer, "{}", fields.join(FIELD_SEPARATOR))?;
        }
        Ok(())
    }

    pub fn write_to_path(&self, path: &Path) -> Result<(), MatrixError> {
        let file = File::create(path).map_err(|e| MatrixError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Element-wise accumulation. Both matrices must cover the same bins.
    pub fn accumulate(&mut self, other: &TransitionMatrix) -> Result<(), MatrixError> {
        if self.shape() != other.shape() {
            return Err(MatrixError::ShapeMismatch {
                expected: self.shape(),
                found: other.shape(),
            });
        }
        for (row, other_row) in self.rows.iter_mut().zip(&other.rows) {
            for (value, addend) in row.iter_mut().zip(other_row) {
                *value += addend;
            }
        }
        Ok(())
    }

    pub fn combine<'a>(
        matrices: impl IntoIterator<Item = &'a TransitionMatrix>,
    ) -> Result<Self, MatrixError> {
        let mut iter = matrices.into_iter();
        let mut total = iter.next().ok_or(MatrixError::NothingToCombine)?.clone();
        for matrix in iter {
            total.accumulate(matrix)?;
        }
        Ok(total)
    }
}

/// Formats `value` as a 23-wide scientific field with 17 fractional digits and
/// a signed exponent of at least two digits, e.g. `1.00000000000000000E+00`.
/// Negative values and three-digit exponents overflow the width.
fn format_field(value: f64) -> String {
    let raw = format!("{:.17E}", value);
    let formatted = match raw.split_once('E') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => {
                let sign = if exp < 0 { '-' } else { '+' };
                format!("{}E{}{:02}", mantissa, sign, exp.abs())
            }
            Err(_) => raw.clone(),
        },
        None => raw.clone(),
    };
    format!("{:>width$}", formatted, width = FIELD_WIDTH)
}
