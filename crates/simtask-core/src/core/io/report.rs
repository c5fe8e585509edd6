use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("JSON error for '{path}': {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Statistics of one observable after a given run of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConvergenceRow {
    pub run: usize,
    pub mean: f64,
    pub stderr: f64,
    pub equilibration_index: usize,
    pub samples: usize,
}

/// One point of an observable against the swept parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub value: String,
    pub mean: f64,
    pub stderr: f64,
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), ReportError> {
    let csv_err = |source| ReportError::Csv {
        path: path_string(path),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer.flush().map_err(|e| ReportError::Io {
        path: path_string(path),
        source: e,
    })
}

/// Writes the per-run convergence table. Unavailable statistics appear as `NaN`.
pub fn write_convergence_table(path: &Path, rows: &[ConvergenceRow]) -> Result<(), ReportError> {
    write_rows(path, rows)
}

/// Writes an observable-versus-parameter table.
///
/// Rows without a usable mean are omitted; a usable mean with an unavailable
/// standard error is kept and written with `NaN`.
pub fn write_sweep_table(path: &Path, rows: &[SweepRow]) -> Result<(), ReportError> {
    write_rows(path, rows.iter().filter(|row| row.mean.is_finite()))
}

/// Writes `value` to a sibling `.tmp` file and renames it over `path`, so an
/// interrupted write leaves the previous document in place.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let staging = staging_path(path);
    let result = write_json_to(&staging, value).and_then(|()| {
        fs::rename(&staging, path).map_err(|e| ReportError::Io {
            path: path_string(path),
            source: e,
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn write_json_to<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let io_err = |source: std::io::Error| ReportError::Io {
        path: path_string(path),
        source,
    };
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| ReportError::Json {
        path: path_string(path),
        source: e,
    })?;
    writer.flush().map_err(io_err)?;
    writer.get_ref().sync_all().map_err(io_err)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ReportError> {
    let file = File::open(path).map_err(|e| ReportError::Io {
        path: path_string(path),
        source: e,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| ReportError::Json {
        path: path_string(path),
        source: e,
    })
}
