//! Per-loan computations: amortization (EAD), collateral LGD, and ECL.

pub mod amortization;
pub mod collateral;
pub mod ecl;

pub use amortization::*;
pub use collateral::*;
pub use ecl::*;
