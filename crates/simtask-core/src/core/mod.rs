//! # Core Module
//!
//! Stateless building blocks shared by the measurement engine and the
//! workflows.
//!
//! - **Observables** ([`observable`]) - Identifiers for engine outputs and the
//!   merged sample series accumulated across resumed runs
//! - **Statistics** ([`stats`]) - Equilibration detection and block averaging
//! - **Control Input** ([`control`]) - Typed control tree, swept parameters and
//!   free-energy (FED) settings
//! - **File I/O** ([`io`]) - Periodic output, transition matrices and reports
//!
//! Nothing in this module launches processes or keeps state between calls.

pub mod control;
pub mod io;
pub mod observable;
pub mod stats;
