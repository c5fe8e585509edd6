//! # Workflows Module
//!
//! High-level procedures built from convergence-driven measurements. These are
//! the entry points a front end calls.
//!
//! - **Parameter Sweep** ([`sweep`]) - One independent measurement per value of a
//!   control parameter, aggregated into a sweep report.
//! - **Free-Energy Windows** ([`fed`]) - Transition-matrix measurements over
//!   overlapping order-parameter windows, combined into one matrix that seeds a
//!   final run over the whole range.
//! - **Adaptive Refinement** ([`refine`]) - A sweep that bisects the parameter
//!   range where the observable changes most.
//!
//! Every workflow validates its full configuration before the first engine run,
//! so configuration errors never consume run budget.

pub mod error;
pub mod fed;
pub mod refine;
pub mod sweep;

pub use error::WorkflowError;
