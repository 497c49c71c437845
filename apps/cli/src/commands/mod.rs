//! Command implementations.

pub mod normalize;
pub mod progress;
pub mod runs;
pub mod serve;
