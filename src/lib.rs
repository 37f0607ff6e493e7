//! MCC - Minimal criteria coevolution of two interacting populations.
//!
//! Two populations evolve against each other: each is the other's evaluation
//! baseline, and a genome survives only by satisfying a minimal criterion
//! against the current opposite population.
//!
//! # Architecture
//!
//! - `schema`: Serde configuration types with validation, run state and summaries
//! - `compute`: Genomes, evaluation, single-population evolution, seeding and coevolution
//! - `logging`: Per-generation data loggers
//! - `domains`: Demonstration navigation domain
//! - `experiment`: Seed-then-coevolve runner used by the binary
//!
//! # Example
//!
//! ```rust,no_run
//! use mcc::{ExperimentConfig, run_experiment};
//!
//! let config = ExperimentConfig::default();
//! let report = run_experiment(&config).unwrap();
//!
//! println!(
//!     "Stopped after {} generations: {:?}",
//!     report.result.generations, report.result.stop_reason
//! );
//! ```

pub mod compute;
pub mod domains;
pub mod experiment;
pub mod logging;
pub mod schema;

// Re-export commonly used types
pub use compute::{CoevolutionContainer, GenomeEvaluator, Initializer};
pub use compute::evolution::EvolutionAlgorithm;
pub use experiment::{ExperimentReport, run_experiment};
pub use schema::{CoevolutionResult, EvolutionAlgorithmConfig, ExperimentConfig};
