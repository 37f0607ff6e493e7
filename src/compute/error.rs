//! Error types for evolution runs and seed initialization.

use crate::schema::{ConfigError, RunState};

/// Errors returned by algorithms, evaluators and the coevolution container.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Operation not allowed in state {0:?}")]
    InvalidState(RunState),
    #[error("Population must not be empty")]
    EmptyPopulation,
    #[error("Population of {actual} genomes exceeds the configured size of {max}")]
    PopulationTooLarge { actual: usize, max: usize },
    #[error("Data logging failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors returned by the seed initializer.
#[derive(Debug, thiserror::Error)]
pub enum InitializationError {
    #[error("No partners to seed against")]
    NoPartners,
    #[error(
        "Failed to find {required} viable genomes for partner {partner} after {restarts} restarts"
    )]
    RestartsExhausted {
        partner: usize,
        required: usize,
        restarts: u32,
    },
    #[error("Seed search failed: {0}")]
    Evolution(#[from] EvolutionError),
}
