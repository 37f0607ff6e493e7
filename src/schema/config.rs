//! Configuration types for evolution algorithms, speciation, archives and evaluation.

use serde::{Deserialize, Serialize};

/// Settings for a single evolution algorithm (one population).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionAlgorithmConfig {
    /// Fixed population size (steady-state) or queue capacity (queueing).
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Number of offspring produced, evaluated and replaced per generation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Generations between uncounted re-scores of the whole population.
    #[serde(default = "default_population_evaluation_frequency")]
    pub population_evaluation_frequency: u32,
    /// Target number of species.
    #[serde(default = "default_specie_count")]
    pub specie_count: usize,
    /// Probability of asexual reproduction (0.0-1.0).
    #[serde(default = "default_asexual_proportion")]
    pub asexual_proportion: f64,
    /// Probability that a sexual pairing draws its second parent from another specie.
    #[serde(default = "default_interspecies_mating_proportion")]
    pub interspecies_mating_proportion: f64,
    /// Reproduction/replacement policy.
    #[serde(default)]
    pub reproduction: ReproductionPolicyKind,
    /// Distance metric and clustering settings.
    #[serde(default)]
    pub speciation: SpeciationConfig,
    /// Window length of the statistics moving averages.
    #[serde(default = "default_moving_average_window")]
    pub moving_average_window: usize,
}

impl Default for EvolutionAlgorithmConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            batch_size: default_batch_size(),
            population_evaluation_frequency: default_population_evaluation_frequency(),
            specie_count: default_specie_count(),
            asexual_proportion: default_asexual_proportion(),
            interspecies_mating_proportion: default_interspecies_mating_proportion(),
            reproduction: ReproductionPolicyKind::default(),
            speciation: SpeciationConfig::default(),
            moving_average_window: default_moving_average_window(),
        }
    }
}

fn default_population_size() -> usize {
    50
}
fn default_batch_size() -> usize {
    10
}
fn default_population_evaluation_frequency() -> u32 {
    100
}
fn default_specie_count() -> usize {
    5
}
fn default_asexual_proportion() -> f64 {
    0.5
}
fn default_interspecies_mating_proportion() -> f64 {
    0.01
}
fn default_moving_average_window() -> usize {
    100
}

/// How offspring replace existing population members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReproductionPolicyKind {
    /// Remove the `batch_size` lowest adjusted-fitness genomes each generation.
    #[default]
    SteadyState,
    /// Append viable offspring to a FIFO queue, dropping the oldest past capacity.
    Queueing,
}

/// Distance metric and k-means settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeciationConfig {
    /// Weight applied to differences between matching genes.
    #[serde(default = "default_matching_coefficient")]
    pub matching_coefficient: f64,
    /// Weight applied to the magnitude of mismatched genes.
    #[serde(default)]
    pub mismatch_coefficient: f64,
    /// Fixed penalty added per mismatched gene.
    #[serde(default = "default_mismatch_constant")]
    pub mismatch_constant: f64,
    /// Upper bound on k-means reallocation passes.
    #[serde(default = "default_max_kmeans_iterations")]
    pub max_kmeans_iterations: usize,
}

impl Default for SpeciationConfig {
    fn default() -> Self {
        Self {
            matching_coefficient: default_matching_coefficient(),
            mismatch_coefficient: 0.0,
            mismatch_constant: default_mismatch_constant(),
            max_kmeans_iterations: default_max_kmeans_iterations(),
        }
    }
}

fn default_matching_coefficient() -> f64 {
    1.0
}
fn default_mismatch_constant() -> f64 {
    10.0
}
fn default_max_kmeans_iterations() -> usize {
    5
}

/// Adaptive novelty archive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Initial behavioral distance a candidate must exceed to be archived.
    #[serde(default = "default_addition_threshold")]
    pub addition_threshold: f64,
    /// Lower bound for the adaptive threshold.
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: f64,
    /// Multiplier applied when too many candidates were archived in a window.
    #[serde(default = "default_threshold_increase_multiplier")]
    pub threshold_increase_multiplier: f64,
    /// Multiplier applied after too many windows without additions.
    #[serde(default = "default_threshold_decrease_multiplier")]
    pub threshold_decrease_multiplier: f64,
    /// Additions per window above which the threshold is raised.
    #[serde(default = "default_max_generational_additions")]
    pub max_generational_additions: usize,
    /// Windows without additions after which the threshold is lowered.
    #[serde(default = "default_max_generations_without_addition")]
    pub max_generations_without_addition: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            addition_threshold: default_addition_threshold(),
            threshold_floor: default_threshold_floor(),
            threshold_increase_multiplier: default_threshold_increase_multiplier(),
            threshold_decrease_multiplier: default_threshold_decrease_multiplier(),
            max_generational_additions: default_max_generational_additions(),
            max_generations_without_addition: default_max_generations_without_addition(),
        }
    }
}

fn default_addition_threshold() -> f64 {
    1.0
}
fn default_threshold_floor() -> f64 {
    0.05
}
fn default_threshold_increase_multiplier() -> f64 {
    1.2
}
fn default_threshold_decrease_multiplier() -> f64 {
    0.95
}
fn default_max_generational_additions() -> usize {
    3
}
fn default_max_generations_without_addition() -> u32 {
    10
}

/// How genomes are evaluated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Serial or thread-pool evaluation.
    #[serde(default)]
    pub parallelism: Parallelism,
    /// Keep decoded phenomes in a side table keyed by genome id.
    #[serde(default)]
    pub phenome_caching: bool,
    /// Which genomes an evaluation pass actually runs.
    #[serde(default)]
    pub selection: EvaluationSelection,
    /// Source of the fitness value.
    #[serde(default)]
    pub fitness: FitnessMode,
}

/// Degree of evaluation parallelism.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum Parallelism {
    /// Deterministic single-threaded evaluation.
    #[default]
    Serial,
    /// Bounded worker pool.
    Parallel { threads: usize },
}

/// Filter deciding which genomes an evaluation pass runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum EvaluationSelection {
    /// Evaluate every genome.
    #[default]
    All,
    /// Evaluate only genomes that were never evaluated.
    OnceOnly,
    /// Evaluate a genome on every `period`-th pass it takes part in.
    Periodic { period: u32 },
}

/// Where fitness comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FitnessMode {
    /// Fitness is whatever the trial reports.
    #[default]
    Objective,
    /// Fitness is mean behavioral distance to the k nearest neighbours.
    Novelty { nearest_neighbors: usize },
}

impl EvolutionAlgorithmConfig {
    /// Validate algorithm parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::ZeroValue("population_size"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroValue("batch_size"));
        }
        if self.population_evaluation_frequency == 0 {
            return Err(ConfigError::ZeroValue("population_evaluation_frequency"));
        }
        if self.specie_count == 0 {
            return Err(ConfigError::ZeroValue("specie_count"));
        }
        if self.moving_average_window == 0 {
            return Err(ConfigError::ZeroValue("moving_average_window"));
        }
        if self.specie_count > self.population_size {
            return Err(ConfigError::SpecieCountTooLarge {
                specie_count: self.specie_count,
                population_size: self.population_size,
            });
        }
        if self.reproduction == ReproductionPolicyKind::SteadyState
            && self.batch_size >= self.population_size
        {
            return Err(ConfigError::BatchTooLarge {
                batch_size: self.batch_size,
                population_size: self.population_size,
            });
        }
        check_proportion(self.asexual_proportion, "asexual_proportion")?;
        check_proportion(
            self.interspecies_mating_proportion,
            "interspecies_mating_proportion",
        )?;
        self.speciation.validate()
    }
}

impl SpeciationConfig {
    /// Validate distance metric coefficients.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative(self.matching_coefficient, "matching_coefficient")?;
        check_non_negative(self.mismatch_coefficient, "mismatch_coefficient")?;
        check_non_negative(self.mismatch_constant, "mismatch_constant")?;
        if self.max_kmeans_iterations == 0 {
            return Err(ConfigError::ZeroValue("max_kmeans_iterations"));
        }
        Ok(())
    }
}

impl ArchiveConfig {
    /// Validate threshold and adaptation parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_non_negative(self.threshold_floor, "threshold_floor")?;
        if self.addition_threshold < self.threshold_floor {
            return Err(ConfigError::InvalidBounds(format!(
                "archive addition threshold ({}) is below its floor ({})",
                self.addition_threshold, self.threshold_floor
            )));
        }
        if self.threshold_increase_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier {
                field: "threshold_increase_multiplier",
                value: self.threshold_increase_multiplier,
            });
        }
        if self.threshold_decrease_multiplier <= 0.0 || self.threshold_decrease_multiplier > 1.0 {
            return Err(ConfigError::InvalidMultiplier {
                field: "threshold_decrease_multiplier",
                value: self.threshold_decrease_multiplier,
            });
        }
        if self.max_generations_without_addition == 0 {
            return Err(ConfigError::ZeroValue("max_generations_without_addition"));
        }
        Ok(())
    }
}

impl EvaluationConfig {
    /// Validate evaluation settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Parallelism::Parallel { threads: 0 } = self.parallelism {
            return Err(ConfigError::ZeroValue("parallelism.threads"));
        }
        if let EvaluationSelection::Periodic { period: 0 } = self.selection {
            return Err(ConfigError::ZeroValue("selection.period"));
        }
        if let FitnessMode::Novelty {
            nearest_neighbors: 0,
        } = self.fitness
        {
            return Err(ConfigError::ZeroValue("fitness.nearest_neighbors"));
        }
        Ok(())
    }
}

pub(crate) fn check_proportion(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::ProportionOutOfRange { field, value })
    }
}

pub(crate) fn check_non_negative(value: f64, field: &'static str) -> Result<(), ConfigError> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NegativeValue { field, value })
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    ZeroValue(&'static str),
    #[error("{field} ({value}) must lie in [0, 1]")]
    ProportionOutOfRange { field: &'static str, value: f64 },
    #[error("{field} ({value}) must be non-negative")]
    NegativeValue { field: &'static str, value: f64 },
    #[error("{field} ({value}) is outside its valid range")]
    InvalidMultiplier { field: &'static str, value: f64 },
    #[error("Batch size [{batch_size}] must be smaller than the population size [{population_size}]")]
    BatchTooLarge {
        batch_size: usize,
        population_size: usize,
    },
    #[error("Specie count [{specie_count}] must be no greater than the population size [{population_size}]")]
    SpecieCountTooLarge {
        specie_count: usize,
        population_size: usize,
    },
    #[error("{side} seed genome count [{seed_count}] must be no greater than the {side} population size [{population_size}]")]
    SeedCountTooLarge {
        side: &'static str,
        seed_count: usize,
        population_size: usize,
    },
    #[error("{criterion} [{required}] must be no greater than the partner population size [{population_size}]")]
    CriterionExceedsPopulation {
        criterion: &'static str,
        required: usize,
        population_size: usize,
    },
    #[error("Seed success criterion [{required}] must be no greater than the seed search population size [{population_size}]")]
    SuccessCriteriaTooLarge {
        required: usize,
        population_size: usize,
    },
    #[error("{0} population uses novelty fitness but has no archive")]
    MissingArchive(&'static str),
    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(EvolutionAlgorithmConfig::default().validate().is_ok());
        assert!(ArchiveConfig::default().validate().is_ok());
        assert!(EvaluationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_batch_must_be_smaller_than_population() {
        let config = EvolutionAlgorithmConfig {
            population_size: 10,
            batch_size: 10,
            specie_count: 2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::BatchTooLarge {
                batch_size: 10,
                population_size: 10
            })
        );

        // Queueing populations may replace their whole capacity in one batch
        let queueing = EvolutionAlgorithmConfig {
            reproduction: ReproductionPolicyKind::Queueing,
            ..config
        };
        assert!(queueing.validate().is_ok());
    }

    #[test]
    fn test_proportion_range() {
        let config = EvolutionAlgorithmConfig {
            asexual_proportion: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ProportionOutOfRange {
                field: "asexual_proportion",
                ..
            })
        ));
    }

    #[test]
    fn test_archive_floor_above_threshold() {
        let config = ArchiveConfig {
            addition_threshold: 0.1,
            threshold_floor: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBounds(_))));
    }

    #[test]
    fn test_zero_threads_rejected() {
        let config = EvaluationConfig {
            parallelism: Parallelism::Parallel { threads: 0 },
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("parallelism.threads"))
        );
    }

    #[test]
    fn test_serialization() {
        let config = EvaluationConfig {
            parallelism: Parallelism::Parallel { threads: 4 },
            selection: EvaluationSelection::Periodic { period: 3 },
            fitness: FitnessMode::Novelty {
                nearest_neighbors: 15,
            },
            phenome_caching: true,
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: EvaluationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.parallelism, config.parallelism);
        assert_eq!(parsed.selection, config.selection);
        assert_eq!(parsed.fitness, config.fitness);
    }
}
