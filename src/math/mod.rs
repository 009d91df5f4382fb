//! Numerical and calendar utilities: matrix log/exp, stochastic rows, rounding, month ends.

pub mod calendar;
pub mod logm;
pub mod numeric;
pub mod stochastic;

pub use calendar::*;
pub use logm::*;
pub use numeric::*;
pub use stochastic::*;
