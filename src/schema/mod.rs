//! Schema module - Configuration, run state and result types for MCC experiments.

mod behavior;
mod config;
mod evolution;
mod experiment;

pub use behavior::*;
pub use config::*;
pub use evolution::*;
pub use experiment::*;
