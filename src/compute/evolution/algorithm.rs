//! Generation loop of one evolving population.
//!
//! Both reproduction policies share the same contract: every generation
//! produces `batch_size` offspring, evaluates them against the current
//! baseline, folds them into the population, re-speciates and records
//! statistics. They differ in how parents are picked and who is replaced.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use super::archive::NoveltyArchive;
use super::selection::RouletteWheelLayout;
use super::speciation::{KMeansClusteringStrategy, SpeciationStrategy, Specie, compare_fittest_first};
use super::statistics::AlgorithmStats;
use crate::compute::error::EvolutionError;
use crate::compute::evaluation::{GenomeEvaluator, PhenomeEvaluator};
use crate::compute::genome::{EvolutionRng, Genome, GenomeDecoder, GenomeFactory, GenomeId, IdGenerator};
use crate::logging::{DataLogger, LoggableElement, NullDataLogger};
use crate::schema::{
    AlgorithmSummary, EvolutionAlgorithmConfig, ReproductionPolicyKind, RunPhase, RunState,
    StopReason,
};

/// How offspring enter the population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReproductionPolicy {
    /// Fixed-size population; the lowest adjusted-fitness genomes are replaced.
    SteadyState,
    /// FIFO queue; parents are taken in queue order starting at `cursor`.
    Queueing { cursor: usize },
}

impl From<ReproductionPolicyKind> for ReproductionPolicy {
    fn from(kind: ReproductionPolicyKind) -> Self {
        match kind {
            ReproductionPolicyKind::SteadyState => Self::SteadyState,
            ReproductionPolicyKind::Queueing => Self::Queueing { cursor: 0 },
        }
    }
}

/// One population and the machinery that evolves it.
pub struct EvolutionAlgorithm<G, D, E>
where
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    config: EvolutionAlgorithmConfig,
    policy: ReproductionPolicy,
    speciation: Box<dyn SpeciationStrategy>,
    rng: EvolutionRng,
    phase: RunPhase,
    state: RunState,
    evaluator: Option<GenomeEvaluator<G, D, E>>,
    ids: IdGenerator,
    population: Vec<G>,
    species: Vec<Specie>,
    archive: Option<Arc<NoveltyArchive>>,
    champion: Option<G>,
    generation: u32,
    max_generations: Option<u32>,
    max_evaluations: Option<u64>,
    stats: AlgorithmStats,
    logger: Box<dyn DataLogger>,
}

impl<G, D, E> EvolutionAlgorithm<G, D, E>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    /// Create an uninitialized algorithm.
    pub fn new(config: EvolutionAlgorithmConfig, seed: u64) -> Result<Self, EvolutionError> {
        config.validate()?;
        Ok(Self {
            policy: config.reproduction.into(),
            speciation: Box::new(KMeansClusteringStrategy::from_config(&config.speciation)),
            rng: EvolutionRng::new(seed),
            phase: RunPhase::Primary,
            state: RunState::Uninitialized,
            evaluator: None,
            ids: IdGenerator::new(),
            population: Vec::new(),
            species: Vec::new(),
            archive: None,
            champion: None,
            generation: 0,
            max_generations: None,
            max_evaluations: None,
            stats: AlgorithmStats::new(config.moving_average_window),
            logger: Box::new(NullDataLogger),
            config,
        })
    }

    pub fn with_logger(mut self, logger: Box<dyn DataLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_speciation_strategy(mut self, strategy: Box<dyn SpeciationStrategy>) -> Self {
        self.speciation = strategy;
        self
    }

    pub fn with_phase(mut self, phase: RunPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Evaluate and speciate the initial population.
    ///
    /// A steady-state population smaller than its configured size is filled
    /// with asexual offspring of the given genomes.
    pub fn initialize(
        &mut self,
        mut evaluator: GenomeEvaluator<G, D, E>,
        factory: &dyn GenomeFactory<G>,
        mut population: Vec<G>,
        max_generations: Option<u32>,
        max_evaluations: Option<u64>,
        archive: Option<NoveltyArchive>,
    ) -> Result<(), EvolutionError> {
        if self.state != RunState::Uninitialized {
            return Err(EvolutionError::InvalidState(self.state));
        }
        if population.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        let capacity = self.config.population_size;
        if population.len() > capacity {
            return Err(EvolutionError::PopulationTooLarge {
                actual: population.len(),
                max: capacity,
            });
        }

        self.ids = factory.id_generator().clone();
        if self.policy == ReproductionPolicy::SteadyState {
            let seeds = population.len();
            while population.len() < capacity {
                let parent = self.rng.index(seeds);
                let child = population[parent].create_offspring(0, &self.ids, &mut self.rng);
                population.push(child);
            }
        }

        let archive = archive.map(Arc::new);
        evaluator.set_archive(archive.clone());
        self.archive = archive;

        self.logger.log_header(&Self::log_columns())?;
        evaluator.initialize()?;
        evaluator.evaluate(&mut population, 0);
        evaluator.refresh_population_criteria(&population);

        self.population = population;
        self.evaluator = Some(evaluator);
        self.max_generations = max_generations;
        self.max_evaluations = max_evaluations;
        self.generation = 0;
        self.respeciate(true);
        self.update_champion();
        self.stats
            .update(0, self.evaluation_count(), &self.population, &self.species);
        self.state = RunState::Ready;

        info!(
            "{} population initialized: {} genomes in {} species, {} viable",
            self.phase,
            self.population.len(),
            self.species.len(),
            self.stats.viable_count
        );
        Ok(())
    }

    /// Advance one generation.
    pub fn perform_one_generation(&mut self) -> Result<(), EvolutionError> {
        match self.state {
            RunState::Ready | RunState::Running | RunState::Paused => {}
            state => return Err(EvolutionError::InvalidState(state)),
        }
        let mut evaluator = self
            .evaluator
            .take()
            .ok_or(EvolutionError::InvalidState(self.state))?;
        self.state = RunState::Running;
        self.generation += 1;
        let generation = self.generation;

        evaluator.refresh_population_criteria(&self.population);
        if generation % self.config.population_evaluation_frequency == 0 {
            self.rescore_population(&mut evaluator, generation);
        }

        match self.policy {
            ReproductionPolicy::SteadyState => self.steady_state_generation(&evaluator, generation),
            ReproductionPolicy::Queueing { .. } => self.queueing_generation(&evaluator, generation),
        }
        evaluator.prune_cache(&self.population);
        self.evaluator = Some(evaluator);

        self.update_champion();
        self.stats.update(
            generation,
            self.evaluation_count(),
            &self.population,
            &self.species,
        );
        self.logger.log_row(&self.log_row())?;
        debug!(
            "{} generation {}: {} genomes, {} species, champion {:.4}, {} evaluations",
            self.phase,
            generation,
            self.population.len(),
            self.species.len(),
            self.stats.max_fitness,
            self.stats.total_evaluations
        );
        Ok(())
    }

    /// Uncounted re-score, full re-speciation and archive update.
    fn rescore_population(&mut self, evaluator: &mut GenomeEvaluator<G, D, E>, generation: u32) {
        evaluator.rescore(&mut self.population, generation);
        self.respeciate(true);
        if let Some(archive) = &self.archive {
            archive.update_parameters();
        }
    }

    fn steady_state_generation(&mut self, evaluator: &GenomeEvaluator<G, D, E>, generation: u32) {
        let batch = self.config.batch_size;
        let size = self.population.len();

        let mut offspring = self.create_offspring_batch(batch, generation);
        assert_eq!(offspring.len(), batch, "Offspring count must equal the batch size");
        evaluator.evaluate_against(&mut offspring, &self.population, generation);

        let removals = self.select_for_removal(batch);
        assert_eq!(removals.len(), batch, "Removal count must equal the batch size");
        self.population.retain(|g| !removals.contains(&g.id()));
        assert_eq!(self.population.len(), size - batch);

        self.archive_offspring(&offspring, generation);
        self.stats.total_offspring += batch as u64;
        self.population.extend(offspring);
        assert_eq!(
            self.population.len(),
            size,
            "Steady-state population size changed"
        );
        self.respeciate(false);
    }

    fn queueing_generation(&mut self, evaluator: &GenomeEvaluator<G, D, E>, generation: u32) {
        let ReproductionPolicy::Queueing { mut cursor } = self.policy else {
            unreachable!("queueing generation under a steady-state policy");
        };
        let batch = self.config.batch_size;
        let len = self.population.len();
        let population = &self.population;
        let rng = &mut self.rng;

        let mut offspring = Vec::with_capacity(batch);
        for _ in 0..batch {
            let parent = &population[cursor % len];
            cursor = (cursor + 1) % len;
            let mate = &population[cursor % len];
            let sexual = len >= 2
                && parent.fitness() > 0.0
                && mate.fitness() > 0.0
                && !rng.is_hit(self.config.asexual_proportion);
            offspring.push(if sexual {
                parent.create_offspring_with(mate, generation, &self.ids, rng)
            } else {
                parent.create_offspring(generation, &self.ids, rng)
            });
        }
        evaluator.evaluate_against(&mut offspring, &self.population, generation);
        self.stats.total_offspring += batch as u64;

        let viable: Vec<G> = offspring
            .into_iter()
            .filter(|g| g.evaluation_info().is_viable())
            .collect();
        self.archive_offspring(&viable, generation);
        self.population.extend(viable);

        let overflow = self
            .population
            .len()
            .saturating_sub(self.config.population_size);
        if overflow > 0 {
            self.population.drain(..overflow);
            cursor = cursor.saturating_sub(overflow);
        }
        self.policy = ReproductionPolicy::Queueing {
            cursor: cursor % self.population.len(),
        };
        self.respeciate(false);
    }

    /// Roulette selection of parents: specie by mean fitness, then genome by fitness.
    fn create_offspring_batch(&mut self, count: usize, generation: u32) -> Vec<G> {
        let population = &self.population;
        let species = &self.species;
        let rng = &mut self.rng;

        let specie_fitness: Vec<f64> = species.iter().map(|s| s.mean_fitness(population)).collect();
        let specie_layout = RouletteWheelLayout::new(&specie_fitness);
        let genome_layouts: Vec<RouletteWheelLayout> = species
            .iter()
            .map(|s| {
                let fitness: Vec<f64> = s.members.iter().map(|&i| population[i].fitness()).collect();
                RouletteWheelLayout::new(&fitness)
            })
            .collect();

        let mut offspring = Vec::with_capacity(count);
        for _ in 0..count {
            let s = specie_layout.spin(rng);
            let specie = &species[s];
            let local = genome_layouts[s].spin(rng);
            let parent = &population[specie.members[local]];

            let sexual_viable =
                specie.len() >= 2 && specie.nonzero_fitness_count(population) >= 2;
            if !sexual_viable || rng.is_hit(self.config.asexual_proportion) {
                offspring.push(parent.create_offspring(generation, &self.ids, rng));
                continue;
            }

            let mate = if species.len() > 1 && rng.is_hit(self.config.interspecies_mating_proportion) {
                let other = specie_layout.remove_outcome(s).spin(rng);
                species[other].members[genome_layouts[other].spin(rng)]
            } else {
                specie.members[genome_layouts[s].remove_outcome(local).spin(rng)]
            };
            offspring.push(parent.create_offspring_with(&population[mate], generation, &self.ids, rng));
        }
        offspring
    }

    /// Ids of the `count` genomes with the lowest fitness / specie size.
    ///
    /// Ties remove the older genome first, then the lower id.
    fn select_for_removal(&self, count: usize) -> HashSet<GenomeId> {
        let mut candidates: Vec<(f64, u32, GenomeId)> = self
            .species
            .iter()
            .flat_map(|specie| {
                let size = specie.len() as f64;
                specie.members.iter().map(move |&i| {
                    let genome = &self.population[i];
                    (genome.fitness() / size, genome.birth_generation(), genome.id())
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        candidates.into_iter().take(count).map(|c| c.2).collect()
    }

    fn archive_offspring(&self, offspring: &[G], generation: u32) {
        if let Some(archive) = &self.archive {
            for genome in offspring {
                archive.test_and_add(genome.id(), &genome.evaluation_info().behavior, generation);
            }
        }
    }

    /// Reassign species after the population changed, then sort members.
    ///
    /// Starts from scratch when `full` is set or the effective specie count
    /// (capped by population size) differs from the current one.
    fn respeciate(&mut self, full: bool) {
        let positions: Vec<_> = self.population.iter().map(Genome::position).collect();
        let specie_count = self.config.specie_count.min(positions.len());
        if full || self.species.len() != specie_count {
            self.species = self
                .speciation
                .initialize_speciation(&positions, specie_count, &mut self.rng);
        } else {
            self.speciation.speciate_genomes(&positions, &mut self.species);
        }
        for specie in &mut self.species {
            assert!(!specie.is_empty(), "Specie {} is empty", specie.id);
            specie.sort_members(&self.population);
        }
    }

    fn update_champion(&mut self) {
        self.champion = self
            .population
            .iter()
            .min_by(|a, b| compare_fittest_first(*a, *b))
            .cloned();
    }

    fn log_columns() -> Vec<LoggableElement> {
        [
            "generation",
            "run_phase",
            "population_size",
            "specie_count",
            "viable_count",
            "champion_fitness",
            "mean_fitness",
            "mean_complexity",
            "evaluations",
        ]
        .into_iter()
        .map(LoggableElement::column)
        .collect()
    }

    fn log_row(&self) -> Vec<LoggableElement> {
        vec![
            LoggableElement::new("generation", self.generation),
            LoggableElement::new("run_phase", self.phase),
            LoggableElement::new("population_size", self.population.len()),
            LoggableElement::new("specie_count", self.species.len()),
            LoggableElement::new("viable_count", self.stats.viable_count),
            LoggableElement::new("champion_fitness", self.stats.max_fitness),
            LoggableElement::new("mean_fitness", self.stats.mean_fitness),
            LoggableElement::new("mean_complexity", self.stats.mean_complexity),
            LoggableElement::new("evaluations", self.stats.total_evaluations),
        ]
    }

    /// Replace the partners this population is evaluated against.
    pub fn update_evaluation_baseline(
        &mut self,
        partners: Vec<Arc<E::Partner>>,
        generation: u32,
    ) -> Result<(), EvolutionError> {
        let evaluator = self
            .evaluator
            .as_mut()
            .ok_or(EvolutionError::InvalidState(self.state))?;
        evaluator.update_evaluation_baseline(partners, generation);
        Ok(())
    }

    /// Phenomes of every decodable population member.
    pub fn decoded_population(&self) -> Vec<Arc<D::Phenome>> {
        self.evaluator
            .as_ref()
            .map(|e| e.decode_population(&self.population))
            .unwrap_or_default()
    }

    /// Run an uncounted trial for every member and report whether all pass
    /// their minimal criteria. Genomes are left untouched.
    pub fn all_viable(&self) -> bool {
        match &self.evaluator {
            Some(evaluator) => self
                .population
                .iter()
                .all(|g| evaluator.trial(g, self.generation).satisfies_minimal_criteria),
            None => false,
        }
    }

    /// Counted evaluations so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluator
            .as_ref()
            .map(GenomeEvaluator::evaluation_count)
            .unwrap_or(0)
    }

    /// Whether the evaluator latched its success condition.
    pub fn stop_condition_satisfied(&self) -> bool {
        self.evaluator
            .as_ref()
            .is_some_and(GenomeEvaluator::stop_condition_satisfied)
    }

    /// Generation or evaluation limit given at initialization, if reached.
    pub fn limit_reached(&self) -> Option<StopReason> {
        if self.max_generations.is_some_and(|max| self.generation >= max) {
            Some(StopReason::MaxGenerations)
        } else if self
            .max_evaluations
            .is_some_and(|max| self.evaluation_count() >= max)
        {
            Some(StopReason::MaxEvaluations)
        } else {
            None
        }
    }

    pub fn pause(&mut self) {
        if matches!(self.state, RunState::Ready | RunState::Running) {
            self.state = RunState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == RunState::Paused {
            self.state = RunState::Running;
        }
    }

    /// Stop the run and close the data logger.
    pub fn stop(&mut self) -> Result<(), EvolutionError> {
        self.state = RunState::Stopped;
        self.logger.close()?;
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.close_logger()?;
        }
        Ok(())
    }

    /// Take back the evaluator, consuming the algorithm.
    pub fn into_evaluator(self) -> Option<GenomeEvaluator<G, D, E>> {
        self.evaluator
    }

    pub fn evaluator(&self) -> Option<&GenomeEvaluator<G, D, E>> {
        self.evaluator.as_ref()
    }

    pub fn population(&self) -> &[G] {
        &self.population
    }

    pub fn species(&self) -> &[Specie] {
        &self.species
    }

    pub fn champion(&self) -> Option<&G> {
        self.champion.as_ref()
    }

    pub fn archive(&self) -> Option<&NoveltyArchive> {
        self.archive.as_deref()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn policy(&self) -> ReproductionPolicy {
        self.policy
    }

    pub fn config(&self) -> &EvolutionAlgorithmConfig {
        &self.config
    }

    pub fn stats(&self) -> &AlgorithmStats {
        &self.stats
    }

    pub fn summary(&self) -> AlgorithmSummary {
        self.stats.summary(self.champion.as_ref().map(Genome::id))
    }

    /// Viable genomes in fittest-first order.
    pub fn viable_genomes(&self) -> Vec<&G> {
        let mut viable: Vec<&G> = self
            .population
            .iter()
            .filter(|g| g.evaluation_info().is_viable())
            .collect();
        viable.sort_by(|a, b| compare_fittest_first(*a, *b));
        viable
    }
}
