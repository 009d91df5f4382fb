//! Input/output helpers.
//!
//! - CSV ingest of history, loan book and recoveries (`ingest`)
//! - result exports (CSV/JSON) (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
