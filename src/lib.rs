//! `ifrs9-ecl` library crate.
//!
//! The binary (`ecl`) is a thin wrapper around this library so that:
//!
//! - the engine is testable without spawning processes
//! - matrices, curves and loan schedules are reusable from other tools
//! - code stays easy to navigate as the project grows
//!
//! The engine runs in two phases: per-segment estimation (transition
//! matrices, PD and cure/recovery curves) and per-loan evaluation
//! (amortization, LGD and ECL). See [`app::pipeline`].

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod loan;
pub mod math;
pub mod matrix;
pub mod report;
