//! Single-population evolution.
//!
//! # Overview
//!
//! - **Algorithm** (`algorithm`): steady-state and queueing generation loops
//! - **Speciation** (`speciation`): k-means clustering of genome positions
//! - **Selection** (`selection`): roulette wheel over species and genomes
//! - **Archive** (`archive`): novelty archive with an adaptive threshold
//! - **Statistics** (`statistics`): per-generation summaries and moving averages
//!
//! # Example
//!
//! ```rust,no_run
//! use mcc::compute::evolution::EvolutionAlgorithm;
//! use mcc::domains::navigation::{AgentDecoder, AgentEvaluator, AgentFactory};
//! use mcc::compute::GenomeEvaluator;
//! use mcc::schema::{EvaluationConfig, EvolutionAlgorithmConfig, NavigationConfig};
//!
//! let navigation = NavigationConfig::default();
//! let factory = AgentFactory::new(navigation.clone());
//! let evaluator = GenomeEvaluator::new(
//!     AgentDecoder::new(&navigation),
//!     AgentEvaluator::new(navigation.clone(), None),
//!     &EvaluationConfig::default(),
//! )
//! .unwrap();
//!
//! let mut rng = mcc::compute::EvolutionRng::new(7);
//! let seeds = mcc::compute::GenomeFactory::create_genome_list(&factory, 10, 0, &mut rng);
//! let mut algorithm = EvolutionAlgorithm::new(EvolutionAlgorithmConfig::default(), 7).unwrap();
//! algorithm.initialize(evaluator, &factory, seeds, Some(50), None, None).unwrap();
//! while algorithm.limit_reached().is_none() {
//!     algorithm.perform_one_generation().unwrap();
//! }
//! ```

mod algorithm;
mod archive;
mod selection;
mod speciation;
mod statistics;

pub use algorithm::*;
pub use archive::*;
pub use selection::*;
pub use speciation::*;
pub use statistics::*;
