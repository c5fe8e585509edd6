//! Readers and writers for the files exchanged with the engine and produced
//! for users.
//!
//! - [`yamldata`] parses the engine's periodic output stream into sample series.
//! - [`tmatrix`] reads, sums and writes transition matrices in the engine's
//!   fixed-width text layout.
//! - [`report`] writes convergence and sweep tables (CSV) and JSON reports.

pub mod report;
pub mod tmatrix;
pub mod yamldata;
