//! # simtask Core Library
//!
//! Convergence-driven orchestration of an external Monte Carlo simulation engine.
//! Instead of guessing run lengths up front, the library keeps extending a
//! simulation by resumed runs until every requested observable reaches its
//! precision target, then reports block-averaged means and standard errors.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture.
//!
//! - **[`core`]: The Foundation.** Stateless data models: observables and merged
//!   sample series, the engine's control input and its amendments, readers and
//!   writers for the engine's output files, and the block-averaging statistics.
//!
//! - **[`engine`]: The Logic Core.** The stateful measurement loop. It launches or
//!   resumes engine runs through the [`engine::interface::Engine`] capability,
//!   tracks every run in a persisted ledger and decides when to stop.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built from
//!   measurements: parameter sweeps, free-energy (transition-matrix) window
//!   sweeps with a final combined run, and adaptive refinement of a sweep.

pub mod core;
pub mod engine;
pub mod workflows;
