//! Run state, progress and result types shared by algorithms and containers.

use serde::{Deserialize, Serialize};

/// Lifecycle of an evolution algorithm or container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Uninitialized,
    /// Initialized and waiting for the first generation.
    Ready,
    Running,
    /// A pause was requested and honored between generations.
    Paused,
    /// A stop condition was reached; loggers are closed.
    Stopped,
}

/// Which part of an experiment an algorithm belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Seed search before coevolution starts.
    Initialization,
    /// Coevolution proper.
    #[default]
    Primary,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialization => write!(f, "Initialization"),
            Self::Primary => write!(f, "Primary"),
        }
    }
}

/// One of the two coevolving populations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    First,
    Second,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
        }
    }
}

/// Reason a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Reached maximum generations.
    MaxGenerations,
    /// Reached the evaluation budget.
    MaxEvaluations,
    /// A population's evaluator latched its success condition.
    StopCondition(Side),
    /// A pause was requested; the run can be resumed.
    Paused,
}

/// Snapshot of one algorithm's statistics after a generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSummary {
    pub generation: u32,
    pub total_evaluations: u64,
    pub evaluations_per_second: f64,
    pub total_offspring: u64,
    pub population_size: usize,
    pub viable_count: usize,
    pub specie_count: usize,
    pub min_specie_size: usize,
    pub max_specie_size: usize,
    pub champion_id: Option<u64>,
    pub champion_fitness: f64,
    pub mean_fitness: f64,
    pub mean_specie_champion_fitness: f64,
    pub min_complexity: f64,
    pub max_complexity: f64,
    pub mean_complexity: f64,
    pub best_fitness_moving_average: f64,
    pub complexity_moving_average: f64,
}

/// Final result of a coevolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoevolutionResult {
    /// Completed container generations.
    pub generations: u32,
    pub stop_reason: StopReason,
    pub first: AlgorithmSummary,
    pub second: AlgorithmSummary,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_serialization() {
        let reason = StopReason::StopCondition(Side::Second);
        let json = serde_json::to_string(&reason).unwrap();
        let parsed: StopReason = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reason);
    }

    #[test]
    fn test_default_state() {
        assert_eq!(RunState::default(), RunState::Uninitialized);
        assert_eq!(RunPhase::default().to_string(), "Primary");
    }
}
