//! Segment-level credit migration: staging, transition matrices, period
//! conversion, default projection, and cure/recovery curves.

pub mod builder;
pub mod cure;
pub mod period;
pub mod projector;
pub mod staging;

pub use builder::*;
pub use cure::*;
pub use period::*;
pub use projector::*;
pub use staging::*;
