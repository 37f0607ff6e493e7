//! End-to-end navigation experiment: seed, verify, coevolve.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::compute::evolution::{EvolutionAlgorithm, NoveltyArchive};
use crate::compute::{
    CoevolutionContainer, EvolutionError, EvolutionRng, GenomeDecoder, GenomeEvaluator,
    GenomeFactory, InitializationError, Initializer, SideSetup,
};
use crate::domains::navigation::{
    AgentDecoder, AgentEvaluator, AgentFactory, TargetDecoder, TargetEvaluator, TargetFactory,
};
use crate::logging::{CsvDataLogger, DataLogger, NullDataLogger};
use crate::schema::{CoevolutionResult, ConfigError, ExperimentConfig};

/// Errors from a complete experiment run.
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Evolution(#[from] EvolutionError),
    #[error(transparent)]
    Initialization(#[from] InitializationError),
    #[error("Failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of [`run_experiment`].
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub seed_agents: usize,
    pub seed_targets: usize,
    pub seeding_evaluations: u64,
    pub seeding_restarts: u32,
    pub seeds_viable: bool,
    pub result: CoevolutionResult,
}

/// Seed agents against random targets, then coevolve both populations.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentReport, ExperimentError> {
    config.validate()?;
    let mut rng = match config.random_seed {
        Some(seed) => EvolutionRng::new(seed),
        None => EvolutionRng::random(),
    };
    let navigation = &config.navigation;
    let agent_factory = AgentFactory::new(navigation.clone());
    let target_factory = TargetFactory::new(navigation.clone());

    let targets = target_factory.create_genome_list(config.targets.seed_count, 0, &mut rng);
    let target_phenomes: Vec<Arc<_>> = targets
        .iter()
        .filter_map(|t| TargetDecoder.decode(t))
        .map(Arc::new)
        .collect();

    info!(
        "Seeding {} agents against {} targets",
        config.agents.seed_count,
        target_phenomes.len()
    );
    let mut initializer = Initializer::new(
        config.initializer.clone(),
        AgentDecoder::new(navigation),
        AgentEvaluator::new(navigation.clone(), None),
        config.agents.evaluation.parallelism,
        rng.next_seed(),
    )?;
    let seeding = initializer.seed_agents(&agent_factory, &target_phenomes, config.agents.seed_count)?;

    let log_file = |name: &str| -> std::io::Result<Box<dyn DataLogger>> {
        match &config.log_directory {
            Some(dir) => csv_logger(dir, name),
            None => Ok(Box::new(NullDataLogger)),
        }
    };
    let agent_logger = log_file("agents.csv")?;
    let target_logger = log_file("targets.csv")?;
    let agents = EvolutionAlgorithm::new(config.agents.algorithm.clone(), rng.next_seed())?
        .with_logger(agent_logger);
    let targets_algorithm = EvolutionAlgorithm::new(config.targets.algorithm.clone(), rng.next_seed())?
        .with_logger(target_logger);
    let mut container = CoevolutionContainer::new(config.coevolution.clone(), agents, targets_algorithm)?;

    let seed_agents = seeding.seeds.len();
    let seed_targets = targets.len();
    container.initialize(
        SideSetup {
            evaluator: GenomeEvaluator::new(
                AgentDecoder::new(navigation),
                AgentEvaluator::new(navigation.clone(), Some(config.agents.behavior.clone())),
                &config.agents.evaluation,
            )?
            .with_logger(log_file("agent_evaluations.csv")?),
            factory: &agent_factory,
            population: seeding.seeds,
            archive: config.agents.archive.clone().map(NoveltyArchive::new),
        },
        SideSetup {
            evaluator: GenomeEvaluator::new(
                TargetDecoder,
                TargetEvaluator::new(navigation),
                &config.targets.evaluation,
            )?
            .with_logger(log_file("target_evaluations.csv")?),
            factory: &target_factory,
            population: targets,
            archive: config.targets.archive.clone().map(NoveltyArchive::new),
        },
    )?;

    let seeds_viable = container.verify_seed_viability();
    if !seeds_viable {
        warn!("Seed populations do not satisfy each other's minimal criteria");
    }
    let result = container.run()?;

    Ok(ExperimentReport {
        seed_agents,
        seed_targets,
        seeding_evaluations: seeding.evaluations,
        seeding_restarts: seeding.restarts,
        seeds_viable,
        result,
    })
}

fn csv_logger(dir: &Path, name: &str) -> std::io::Result<Box<dyn DataLogger>> {
    fs::create_dir_all(dir)?;
    Ok(Box::new(CsvDataLogger::create(dir.join(name))?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        CoevolutionConfig, EvolutionAlgorithmConfig, InitializerConfig, ReproductionPolicyKind,
        StopReason,
    };

    fn small_config() -> ExperimentConfig {
        let mut config = ExperimentConfig {
            random_seed: Some(5),
            coevolution: CoevolutionConfig {
                max_generations: Some(3),
                ..Default::default()
            },
            initializer: InitializerConfig {
                algorithm: EvolutionAlgorithmConfig {
                    population_size: 20,
                    batch_size: 5,
                    specie_count: 2,
                    ..Default::default()
                },
                max_evaluations_per_attempt: 3000,
                ..Default::default()
            },
            ..Default::default()
        };
        config.agents.seed_count = 4;
        config.agents.algorithm = EvolutionAlgorithmConfig {
            population_size: 12,
            batch_size: 4,
            specie_count: 2,
            reproduction: ReproductionPolicyKind::Queueing,
            ..Default::default()
        };
        config.targets.seed_count = 2;
        config.targets.algorithm = EvolutionAlgorithmConfig {
            population_size: 6,
            batch_size: 2,
            specie_count: 2,
            reproduction: ReproductionPolicyKind::Queueing,
            ..Default::default()
        };
        config
    }

    #[test]
    fn test_small_experiment_runs_and_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let config = ExperimentConfig {
            log_directory: Some(dir.path().join("logs")),
            ..small_config()
        };
        let report = run_experiment(&config).unwrap();

        assert_eq!(report.seed_agents, 4);
        assert_eq!(report.seed_targets, 2);
        assert!(report.seeds_viable);
        assert_eq!(report.result.stop_reason, StopReason::MaxGenerations);
        assert_eq!(report.result.generations, 3);

        for name in ["agents.csv", "targets.csv"] {
            let contents = fs::read_to_string(dir.path().join("logs").join(name)).unwrap();
            assert_eq!(contents.lines().count(), 4);
        }

        // One header, then one row per counted trial.
        let trials = |name: &str| {
            let contents = fs::read_to_string(dir.path().join("logs").join(name)).unwrap();
            let mut lines = contents.lines();
            let header = lines.next().unwrap().to_string();
            (header, lines.count() as u64)
        };
        let (header, rows) = trials("agent_evaluations.csv");
        assert_eq!(header, "generation,genome_id,fitness,targets_solved,viable");
        assert_eq!(rows, report.result.first.total_evaluations);
        let (header, rows) = trials("target_evaluations.csv");
        assert_eq!(header, "generation,genome_id,fitness,agents_solved,viable");
        assert_eq!(rows, report.result.second.total_evaluations);
    }

    #[test]
    fn test_invalid_config_rejected_before_seeding() {
        let mut config = small_config();
        config.agents.seed_count = 100;
        assert!(matches!(
            run_experiment(&config),
            Err(ExperimentError::Config(ConfigError::SeedCountTooLarge { .. }))
        ));
    }
}
