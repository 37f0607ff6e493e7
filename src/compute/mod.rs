//! Compute module - Evolution, evaluation and coevolution of populations.

mod behavior;
mod coevolution;
mod error;
mod evaluation;
mod genome;
mod initializer;

pub mod evolution;

pub use behavior::*;
pub use coevolution::*;
pub use error::*;
pub use evaluation::{GenomeEvaluator, PhenomeEvaluator, TrialResult};
pub use genome::*;
pub use initializer::*;
