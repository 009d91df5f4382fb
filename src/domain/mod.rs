//! Domain types used throughout the engine.
//!
//! This module defines:
//!
//! - stage labels and matrix sizes (`Stage`, `MatrixSize`)
//! - historical and current-book inputs (`LoanObservation`, `RecoveryObservation`, `LoanRecord`)
//! - collateral inputs (`CollateralItem`, `CollateralParameters`)
//! - per-loan outputs (`AmortizationEntry`, `LgdEntry`, `EclEntry`, `EclRecord`)
//! - run configuration and diagnostics (`EngineConfig`, `Diagnostics`)

pub mod types;

pub use types::*;
