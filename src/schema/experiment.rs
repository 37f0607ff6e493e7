//! Coevolution, initializer and experiment-level configuration.

use serde::{Deserialize, Serialize};

use super::behavior::BehaviorConfig;
use super::config::{
    ArchiveConfig, ConfigError, EvaluationConfig, EvolutionAlgorithmConfig, FitnessMode,
    ReproductionPolicyKind, check_non_negative,
};

/// Global run limits and scheduling for the coevolution container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoevolutionConfig {
    /// Stop after this many container generations.
    #[serde(default)]
    pub max_generations: Option<u32>,
    /// Stop once the evaluation budget is spent.
    #[serde(default)]
    pub max_evaluations: Option<u64>,
    /// How `max_evaluations` is compared against the two evaluation counters.
    #[serde(default)]
    pub evaluation_budget: EvaluationBudget,
    /// Order in which the two populations advance.
    #[serde(default)]
    pub schedule: GenerationSchedule,
}

impl Default for CoevolutionConfig {
    fn default() -> Self {
        Self {
            max_generations: Some(200),
            max_evaluations: None,
            evaluation_budget: EvaluationBudget::default(),
            schedule: GenerationSchedule::default(),
        }
    }
}

/// Evaluation budget accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationBudget {
    /// Stop when either population alone reaches the budget.
    #[default]
    PerSide,
    /// Stop when both populations together reach the budget.
    Summed,
}

/// Generation interleaving of the two populations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GenerationSchedule {
    /// One generation each, first population first.
    #[default]
    Alternating,
    /// `first` generations of the first population, then `second` of the second.
    Batched { first: u32, second: u32 },
}

/// Seed search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializerConfig {
    /// Algorithm settings for the seed search population.
    #[serde(default = "default_initializer_algorithm")]
    pub algorithm: EvolutionAlgorithmConfig,
    /// Evaluation budget of one attempt before it restarts.
    #[serde(default = "default_max_evaluations_per_attempt")]
    pub max_evaluations_per_attempt: u64,
    /// Restarts allowed per partner before giving up.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
    /// Objective- or novelty-driven seed search.
    #[serde(default)]
    pub search: FitnessMode,
    /// Novelty archive used when `search` is novelty-driven.
    #[serde(default)]
    pub archive: ArchiveConfig,
    /// Distinct viable agents a seed search must find for one partner.
    #[serde(default = "default_num_agent_success_criteria")]
    pub num_agent_success_criteria: usize,
    /// Maximum agents seeded per partner.
    #[serde(default = "default_resource_limit")]
    pub resource_limit: usize,
}

impl Default for InitializerConfig {
    fn default() -> Self {
        Self {
            algorithm: default_initializer_algorithm(),
            max_evaluations_per_attempt: default_max_evaluations_per_attempt(),
            max_restarts: default_max_restarts(),
            search: FitnessMode::default(),
            archive: ArchiveConfig::default(),
            num_agent_success_criteria: default_num_agent_success_criteria(),
            resource_limit: default_resource_limit(),
        }
    }
}

fn default_initializer_algorithm() -> EvolutionAlgorithmConfig {
    EvolutionAlgorithmConfig {
        population_size: 40,
        batch_size: 10,
        specie_count: 4,
        ..Default::default()
    }
}
fn default_max_evaluations_per_attempt() -> u64 {
    20_000
}
fn default_max_restarts() -> u32 {
    5
}
fn default_num_agent_success_criteria() -> usize {
    2
}
fn default_resource_limit() -> usize {
    2
}

impl InitializerConfig {
    /// Validate the seed search settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm.validate()?;
        self.archive.validate()?;
        if self.max_evaluations_per_attempt == 0 {
            return Err(ConfigError::ZeroValue("max_evaluations_per_attempt"));
        }
        if self.resource_limit == 0 {
            return Err(ConfigError::ZeroValue("resource_limit"));
        }
        if self.num_agent_success_criteria == 0 {
            return Err(ConfigError::ZeroValue("num_agent_success_criteria"));
        }
        if self.num_agent_success_criteria > self.algorithm.population_size {
            return Err(ConfigError::SuccessCriteriaTooLarge {
                required: self.num_agent_success_criteria,
                population_size: self.algorithm.population_size,
            });
        }
        if let FitnessMode::Novelty {
            nearest_neighbors: 0,
        } = self.search
        {
            return Err(ConfigError::ZeroValue("initializer.search.nearest_neighbors"));
        }
        Ok(())
    }
}

/// One coevolving population.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PopulationConfig {
    /// Number of seed genomes the population starts from.
    #[serde(default = "default_seed_count")]
    pub seed_count: usize,
    #[serde(default)]
    pub algorithm: EvolutionAlgorithmConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    /// Novelty archive; required when the fitness mode is novelty-driven.
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

fn default_seed_count() -> usize {
    10
}

/// Point-navigation demonstration domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Where every agent starts.
    #[serde(default)]
    pub start: (f64, f64),
    /// Goals and positions are confined to `[-extent, extent]` on both axes.
    #[serde(default = "default_arena_extent")]
    pub arena_extent: f64,
    /// Longest distance an agent covers in one step.
    #[serde(default = "default_max_step_length")]
    pub max_step_length: f64,
    /// Steps in a freshly created agent.
    #[serde(default = "default_initial_agent_steps")]
    pub initial_agent_steps: usize,
    /// Upper bound on agent steps.
    #[serde(default = "default_max_agent_steps")]
    pub max_agent_steps: usize,
    /// Gaussian strength of step mutations (fraction of the step range).
    #[serde(default = "default_step_mutation_strength")]
    pub step_mutation_strength: f64,
    /// Probability of appending a step on mutation.
    #[serde(default = "default_add_step_probability")]
    pub add_step_probability: f64,
    /// Probability of dropping a step on mutation.
    #[serde(default = "default_remove_step_probability")]
    pub remove_step_probability: f64,
    /// Target radius bounds.
    #[serde(default = "default_target_radius_bounds")]
    pub target_radius_bounds: (f64, f64),
    /// Maximum distance from start of a freshly created target.
    #[serde(default = "default_initial_goal_distance")]
    pub initial_goal_distance: f64,
    /// Gaussian strength of goal mutations (fraction of the arena).
    #[serde(default = "default_goal_mutation_strength")]
    pub goal_mutation_strength: f64,
    /// Agent viability: targets that must be reached.
    #[serde(default = "default_one")]
    pub min_targets_solved: usize,
    /// Target viability: agents that must reach the target.
    #[serde(default = "default_one")]
    pub min_agents_solved: usize,
    /// Target viability: agents that must fail to reach the target.
    #[serde(default)]
    pub min_agents_failed: usize,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            start: (0.0, 0.0),
            arena_extent: default_arena_extent(),
            max_step_length: default_max_step_length(),
            initial_agent_steps: default_initial_agent_steps(),
            max_agent_steps: default_max_agent_steps(),
            step_mutation_strength: default_step_mutation_strength(),
            add_step_probability: default_add_step_probability(),
            remove_step_probability: default_remove_step_probability(),
            target_radius_bounds: default_target_radius_bounds(),
            initial_goal_distance: default_initial_goal_distance(),
            goal_mutation_strength: default_goal_mutation_strength(),
            min_targets_solved: 1,
            min_agents_solved: 1,
            min_agents_failed: 0,
        }
    }
}

fn default_arena_extent() -> f64 {
    20.0
}
fn default_max_step_length() -> f64 {
    1.0
}
fn default_initial_agent_steps() -> usize {
    4
}
fn default_max_agent_steps() -> usize {
    40
}
fn default_step_mutation_strength() -> f64 {
    0.25
}
fn default_add_step_probability() -> f64 {
    0.2
}
fn default_remove_step_probability() -> f64 {
    0.05
}
fn default_target_radius_bounds() -> (f64, f64) {
    (0.5, 2.5)
}
fn default_initial_goal_distance() -> f64 {
    4.0
}
fn default_goal_mutation_strength() -> f64 {
    0.02
}
fn default_one() -> usize {
    1
}

impl NavigationConfig {
    /// Validate domain parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.arena_extent <= 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "arena extent ({}) must be positive",
                self.arena_extent
            )));
        }
        if self.max_step_length <= 0.0 {
            return Err(ConfigError::InvalidBounds(format!(
                "max step length ({}) must be positive",
                self.max_step_length
            )));
        }
        if self.initial_agent_steps == 0 {
            return Err(ConfigError::ZeroValue("initial_agent_steps"));
        }
        if self.initial_agent_steps > self.max_agent_steps {
            return Err(ConfigError::InvalidBounds(format!(
                "initial agent steps ({}) exceed the maximum ({})",
                self.initial_agent_steps, self.max_agent_steps
            )));
        }
        let (r_min, r_max) = self.target_radius_bounds;
        if r_min <= 0.0 || r_min > r_max {
            return Err(ConfigError::InvalidBounds(format!(
                "target radius bounds ({r_min}, {r_max}) must be positive and ordered"
            )));
        }
        check_non_negative(self.initial_goal_distance, "initial_goal_distance")?;
        check_non_negative(self.step_mutation_strength, "step_mutation_strength")?;
        check_non_negative(self.goal_mutation_strength, "goal_mutation_strength")?;
        super::config::check_proportion(self.add_step_probability, "add_step_probability")?;
        super::config::check_proportion(self.remove_step_probability, "remove_step_probability")?;
        Ok(())
    }
}

/// Complete experiment: both populations, seeding and run limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub coevolution: CoevolutionConfig,
    #[serde(default = "default_agents")]
    pub agents: PopulationConfig,
    #[serde(default = "default_targets")]
    pub targets: PopulationConfig,
    #[serde(default)]
    pub initializer: InitializerConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    /// Directory for per-generation CSV data logs; logging is disabled when unset.
    #[serde(default)]
    pub log_directory: Option<std::path::PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            random_seed: Some(42),
            coevolution: CoevolutionConfig::default(),
            agents: default_agents(),
            targets: default_targets(),
            initializer: InitializerConfig::default(),
            navigation: NavigationConfig::default(),
            log_directory: None,
        }
    }
}

fn default_agents() -> PopulationConfig {
    PopulationConfig {
        seed_count: 10,
        algorithm: EvolutionAlgorithmConfig {
            population_size: 60,
            batch_size: 10,
            specie_count: 4,
            reproduction: ReproductionPolicyKind::Queueing,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn default_targets() -> PopulationConfig {
    PopulationConfig {
        seed_count: 5,
        algorithm: EvolutionAlgorithmConfig {
            population_size: 20,
            batch_size: 5,
            specie_count: 2,
            reproduction: ReproductionPolicyKind::Queueing,
            ..Default::default()
        },
        ..Default::default()
    }
}

impl ExperimentConfig {
    /// Load from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate every section plus the cross-population rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (side, population) in [("agent", &self.agents), ("target", &self.targets)] {
            population.algorithm.validate()?;
            population.evaluation.validate()?;
            population.behavior.validate()?;
            match (&population.archive, population.evaluation.fitness) {
                (Some(archive), _) => archive.validate()?,
                (None, FitnessMode::Novelty { .. }) => {
                    return Err(ConfigError::MissingArchive(side));
                }
                (None, FitnessMode::Objective) => {}
            }
            if population.seed_count == 0 {
                return Err(ConfigError::ZeroValue("seed_count"));
            }
            if population.seed_count > population.algorithm.population_size {
                return Err(ConfigError::SeedCountTooLarge {
                    side,
                    seed_count: population.seed_count,
                    population_size: population.algorithm.population_size,
                });
            }
        }

        let navigation = &self.navigation;
        navigation.validate()?;
        if navigation.min_targets_solved > self.targets.algorithm.population_size {
            return Err(ConfigError::CriterionExceedsPopulation {
                criterion: "min_targets_solved",
                required: navigation.min_targets_solved,
                population_size: self.targets.algorithm.population_size,
            });
        }
        let agent_criteria = navigation.min_agents_solved + navigation.min_agents_failed;
        if agent_criteria > self.agents.algorithm.population_size {
            return Err(ConfigError::CriterionExceedsPopulation {
                criterion: "min_agents_solved + min_agents_failed",
                required: agent_criteria,
                population_size: self.agents.algorithm.population_size,
            });
        }

        self.initializer.validate()?;

        if let GenerationSchedule::Batched { first, second } = self.coevolution.schedule
            && (first == 0 || second == 0)
        {
            return Err(ConfigError::ZeroValue("schedule batch length"));
        }
        Ok(())
    }
}
