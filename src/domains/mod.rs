//! Demonstration domains implementing the genome, decoder and evaluator contracts.

pub mod navigation;
