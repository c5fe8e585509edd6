//! Job configuration: a TOML job file, `--set` overrides and CLI flags,
//! layered over built-in defaults into core configuration values.

mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{build_fed, build_measure, build_refine, build_sweep};
