//! # Engine Module
//!
//! This module drives the external Monte Carlo engine until a measurement is
//! statistically converged or its budget runs out.
//!
//! ## Overview
//!
//! A [`measurement::Measurement`] is a small state machine over repeated engine
//! runs. Every run after the first resumes the most recent successful one, so the
//! per-observable sample series only ever grow. After each run the merged series
//! are re-analysed with block averaging and the machine decides whether to stop.
//! All progress is persisted to a ledger so an interrupted measurement picks up
//! where it left off.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Observables, precision targets, budgets and validation
//! - **Engine Capability** ([`interface`]) - The [`interface::Engine`] trait and run handles
//! - **Process Engine** ([`process`]) - Launching the engine binary in staged run directories
//! - **State Tracking** ([`state`]) - Measurement states, run records and the persisted ledger
//! - **Measurement** ([`measurement`]) - The convergence loop and its final report
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - Engine-specific error types

pub mod config;
pub mod context;
pub mod error;
pub mod interface;
pub mod measurement;
pub mod process;
pub mod progress;
pub mod state;
