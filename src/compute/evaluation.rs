//! Genome evaluation pipeline.
//!
//! [`GenomeEvaluator`] decodes genomes, runs one trial per selected genome
//! through a domain [`PhenomeEvaluator`], and writes the outcome into each
//! genome's [`EvaluationInfo`]. Trials run serially or on a bounded rayon
//! pool; the only state shared across workers is the evaluation counter, the
//! stop flag, the phenome cache and the novelty archive.

use std::collections::{HashMap, HashSet};
use std::io;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::warn;
use rayon::prelude::*;

use crate::compute::behavior::euclidean;
use crate::compute::error::EvolutionError;
use crate::compute::evolution::NoveltyArchive;
use crate::compute::genome::{EvaluationInfo, Genome, GenomeDecoder, GenomeId};
use crate::logging::{DataLogger, NullDataLogger};
use crate::schema::{EvaluationConfig, EvaluationSelection, FitnessMode, Parallelism};

/// Outcome of one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrialResult {
    pub fitness: f64,
    pub aux_fitness: Vec<f64>,
    pub behavior: Vec<f64>,
    pub satisfies_minimal_criteria: bool,
    /// The trial crossed the domain's success threshold.
    pub stop_condition: bool,
}

impl TrialResult {
    /// Result for a phenome that could not be decoded or run.
    pub fn non_viable() -> Self {
        Self::default()
    }
}

/// Domain-specific trial runner.
pub trait PhenomeEvaluator: Send + Sync {
    /// What is being evaluated.
    type Phenome: Send + Sync;
    /// What it is evaluated against (the other population's phenomes).
    type Partner: Send + Sync;

    /// Run exactly one trial.
    fn run_trial(&self, phenome: &Self::Phenome, generation: u32) -> TrialResult;

    /// Called once before the first evaluation. Writes the evaluation log header.
    fn initialize(&mut self, logger: &mut dyn DataLogger) -> io::Result<()> {
        let _ = logger;
        Ok(())
    }

    /// Record one counted trial in the evaluation log.
    fn log_trial(
        &self,
        logger: &mut dyn DataLogger,
        genome: GenomeId,
        result: &TrialResult,
        generation: u32,
    ) -> io::Result<()> {
        let _ = (logger, genome, result, generation);
        Ok(())
    }

    /// Replace the set of partners trials are run against.
    fn update_evaluation_baseline(&mut self, partners: Vec<Arc<Self::Partner>>, generation: u32);

    /// Rebuild population-dependent minimal criteria from the population's behaviors.
    fn refresh_population_criteria(&mut self, behaviors: &[Vec<f64>]) {
        let _ = behaviors;
    }

    /// Clear state for an independent run.
    fn reset(&mut self) {}
}

enum EvaluationStrategy {
    Serial,
    Parallel(rayon::ThreadPool),
}

enum PhenomeCache<P> {
    Disabled,
    Enabled(Mutex<HashMap<GenomeId, Option<Arc<P>>>>),
}

/// Evaluates genome lists against the current baseline.
pub struct GenomeEvaluator<G, D, E>
where
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    decoder: D,
    evaluator: E,
    strategy: EvaluationStrategy,
    cache: PhenomeCache<D::Phenome>,
    selection: EvaluationSelection,
    fitness_mode: FitnessMode,
    archive: Option<Arc<NoveltyArchive>>,
    evaluation_count: AtomicU64,
    stop_condition: AtomicBool,
    logger: Mutex<Box<dyn DataLogger>>,
    _genome: PhantomData<fn(&G)>,
}

impl<G, D, E> GenomeEvaluator<G, D, E>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    pub fn new(decoder: D, evaluator: E, config: &EvaluationConfig) -> Result<Self, EvolutionError> {
        config.validate()?;
        let strategy = match config.parallelism {
            Parallelism::Serial => EvaluationStrategy::Serial,
            Parallelism::Parallel { threads } => EvaluationStrategy::Parallel(
                rayon::ThreadPoolBuilder::new().num_threads(threads).build()?,
            ),
        };
        let cache = if config.phenome_caching {
            PhenomeCache::Enabled(Mutex::new(HashMap::new()))
        } else {
            PhenomeCache::Disabled
        };

        Ok(Self {
            decoder,
            evaluator,
            strategy,
            cache,
            selection: config.selection,
            fitness_mode: config.fitness,
            archive: None,
            evaluation_count: AtomicU64::new(0),
            stop_condition: AtomicBool::new(false),
            logger: Mutex::new(Box::new(NullDataLogger)),
            _genome: PhantomData,
        })
    }

    /// Per-trial evaluation log; discarded by default.
    pub fn with_logger(mut self, logger: Box<dyn DataLogger>) -> Self {
        self.logger = Mutex::new(logger);
        self
    }

    /// Archive consulted by novelty fitness.
    pub fn set_archive(&mut self, archive: Option<Arc<NoveltyArchive>>) {
        self.archive = archive;
    }

    pub fn archive(&self) -> Option<&Arc<NoveltyArchive>> {
        self.archive.as_ref()
    }

    pub fn fitness_mode(&self) -> FitnessMode {
        self.fitness_mode
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn evaluator_mut(&mut self) -> &mut E {
        &mut self.evaluator
    }

    /// Let the domain evaluator write its log header.
    pub fn initialize(&mut self) -> io::Result<()> {
        let logger = self.logger.get_mut().unwrap_or_else(PoisonError::into_inner);
        self.evaluator.initialize(&mut **logger)
    }

    /// Flush and close the evaluation log.
    pub fn close_logger(&mut self) -> io::Result<()> {
        self.logger
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .close()
    }

    pub fn update_evaluation_baseline(&mut self, partners: Vec<Arc<E::Partner>>, generation: u32) {
        self.evaluator.update_evaluation_baseline(partners, generation);
    }

    pub fn refresh_population_criteria(&mut self, population: &[G]) {
        let behaviors: Vec<Vec<f64>> = population
            .iter()
            .map(|g| g.evaluation_info().behavior.clone())
            .collect();
        self.evaluator.refresh_population_criteria(&behaviors);
    }

    /// Counted trials so far.
    pub fn evaluation_count(&self) -> u64 {
        self.evaluation_count.load(Ordering::Relaxed)
    }

    pub fn stop_condition_satisfied(&self) -> bool {
        self.stop_condition.load(Ordering::Relaxed)
    }

    /// Clear counters, the stop flag and the cache for an independent run.
    pub fn reset(&mut self) {
        self.evaluation_count.store(0, Ordering::Relaxed);
        self.stop_condition.store(false, Ordering::Relaxed);
        if let PhenomeCache::Enabled(map) = &self.cache {
            lock(map).clear();
        }
        self.evaluator.reset();
    }

    /// Decode a genome, consulting the cache when enabled.
    pub fn decode(&self, genome: &G) -> Option<Arc<D::Phenome>> {
        match &self.cache {
            PhenomeCache::Disabled => self.decoder.decode(genome).map(Arc::new),
            PhenomeCache::Enabled(map) => {
                if let Some(phenome) = lock(map).get(&genome.id()) {
                    return phenome.clone();
                }
                let phenome = self.decoder.decode(genome).map(Arc::new);
                lock(map).insert(genome.id(), phenome.clone());
                phenome
            }
        }
    }

    /// Decode every genome, dropping those that cannot be expressed.
    pub fn decode_population(&self, genomes: &[G]) -> Vec<Arc<D::Phenome>> {
        genomes.iter().filter_map(|g| self.decode(g)).collect()
    }

    /// Drop cached phenomes of genomes no longer in `live`.
    pub fn prune_cache(&self, live: &[G]) {
        if let PhenomeCache::Enabled(map) = &self.cache {
            let ids: HashSet<GenomeId> = live.iter().map(Genome::id).collect();
            lock(map).retain(|id, _| ids.contains(id));
        }
    }

    pub fn cached_phenomes(&self) -> usize {
        match &self.cache {
            PhenomeCache::Disabled => 0,
            PhenomeCache::Enabled(map) => lock(map).len(),
        }
    }

    /// Run one uncounted trial without touching the genome.
    pub fn trial(&self, genome: &G, generation: u32) -> TrialResult {
        match self.decode(genome) {
            Some(phenome) => self.evaluator.run_trial(&phenome, generation),
            None => TrialResult::non_viable(),
        }
    }

    /// Counted evaluation of `genomes`.
    pub fn evaluate(&self, genomes: &mut [G], generation: u32) {
        self.evaluate_against(genomes, &[], generation);
    }

    /// Counted evaluation of `genomes`; novelty is measured against
    /// `genomes`, `population` and the archive.
    pub fn evaluate_against(&self, genomes: &mut [G], population: &[G], generation: u32) {
        let selected: Vec<bool> = genomes
            .iter()
            .map(|g| self.is_selected(g.evaluation_info()))
            .collect();
        for (genome, _) in genomes.iter_mut().zip(&selected).filter(|(_, s)| !**s) {
            genome.evaluation_info_mut().skip_count += 1;
        }

        self.run_trials(genomes, &selected, generation, true);

        if let FitnessMode::Novelty { nearest_neighbors } = self.fitness_mode {
            self.assign_novelty(genomes, population, &selected, nearest_neighbors);
        }
    }

    /// Uncounted re-score of a whole population.
    ///
    /// Objective fitness reruns every trial; novelty fitness is recomputed
    /// from the stored behaviors without new trials.
    pub fn rescore(&self, genomes: &mut [G], generation: u32) {
        let all = vec![true; genomes.len()];
        match self.fitness_mode {
            FitnessMode::Objective => self.run_trials(genomes, &all, generation, false),
            FitnessMode::Novelty { nearest_neighbors } => {
                self.assign_novelty(genomes, &[], &all, nearest_neighbors)
            }
        }
    }

    fn is_selected(&self, info: &EvaluationInfo) -> bool {
        match self.selection {
            EvaluationSelection::All => true,
            EvaluationSelection::OnceOnly => !info.was_evaluated(),
            EvaluationSelection::Periodic { period } => {
                (info.evaluation_count + info.skip_count) % u64::from(period) == 0
            }
        }
    }

    fn run_trials(&self, genomes: &mut [G], selected: &[bool], generation: u32, counted: bool) {
        let run = |genome: &mut G| {
            let result = self.trial(genome, generation);
            if counted {
                self.evaluation_count.fetch_add(1, Ordering::Relaxed);
                if result.stop_condition {
                    self.stop_condition.store(true, Ordering::Relaxed);
                }
                let id = genome.id();
                if let Err(e) =
                    self.evaluator
                        .log_trial(&mut **lock(&self.logger), id, &result, generation)
                {
                    warn!("Failed to log trial of genome {id}: {e}");
                }
            }

            let info = genome.evaluation_info_mut();
            info.fitness = result.fitness;
            info.aux_fitness = result.aux_fitness;
            info.behavior = result.behavior;
            info.viable = Some(result.satisfies_minimal_criteria);
            if counted {
                info.evaluation_count += 1;
            }
        };

        match &self.strategy {
            EvaluationStrategy::Serial => genomes
                .iter_mut()
                .zip(selected)
                .filter(|(_, s)| **s)
                .for_each(|(g, _)| run(g)),
            EvaluationStrategy::Parallel(pool) => pool.install(|| {
                genomes
                    .par_iter_mut()
                    .zip(selected.par_iter())
                    .filter(|(_, s)| **s)
                    .for_each(|(g, _)| run(g))
            }),
        }
    }

    /// Replace fitness with mean distance to the `k` nearest behaviors.
    fn assign_novelty(&self, genomes: &mut [G], population: &[G], targets: &[bool], k: usize) {
        let archived = self
            .archive
            .as_ref()
            .map(|a| a.behaviors())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        let pool: Vec<(GenomeId, Vec<f64>)> = genomes
            .iter()
            .chain(population.iter())
            .filter(|g| seen.insert(g.id()))
            .map(|g| (g.id(), g.evaluation_info().behavior.clone()))
            .collect();

        for (genome, _) in genomes.iter_mut().zip(targets).filter(|(_, t)| **t) {
            let id = genome.id();
            let info = genome.evaluation_info_mut();
            info.fitness = novelty(&info.behavior, id, &pool, &archived, k);
        }
    }
}

fn novelty(
    behavior: &[f64],
    id: GenomeId,
    pool: &[(GenomeId, Vec<f64>)],
    archived: &[Vec<f64>],
    k: usize,
) -> f64 {
    if behavior.is_empty() || k == 0 {
        return 0.0;
    }
    let mut distances: Vec<f64> = pool
        .iter()
        .filter(|(other, b)| *other != id && !b.is_empty())
        .map(|(_, b)| b)
        .chain(archived.iter())
        .map(|b| euclidean(behavior, b))
        .collect();
    if distances.is_empty() {
        return 0.0;
    }
    distances.sort_by(f64::total_cmp);
    let nearest = &distances[..k.min(distances.len())];
    nearest.iter().sum::<f64>() / nearest.len() as f64
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compute::genome::{CoordinateVector, EvolutionRng, GenomeFactory, IdGenerator};
    use crate::schema::{ArchiveConfig, EvaluationConfig};

    /// Minimal genome: a single value that is also its fitness.
    #[derive(Debug, Clone)]
    pub(crate) struct ScalarGenome {
        pub id: GenomeId,
        pub birth_generation: u32,
        pub value: f64,
        pub info: EvaluationInfo,
    }

    impl ScalarGenome {
        pub(crate) fn new(id: GenomeId, value: f64) -> Self {
            Self {
                id,
                birth_generation: 0,
                value,
                info: EvaluationInfo::default(),
            }
        }
    }

    impl Genome for ScalarGenome {
        fn id(&self) -> GenomeId {
            self.id
        }
        fn birth_generation(&self) -> u32 {
            self.birth_generation
        }
        fn evaluation_info(&self) -> &EvaluationInfo {
            &self.info
        }
        fn evaluation_info_mut(&mut self) -> &mut EvaluationInfo {
            &mut self.info
        }
        fn complexity(&self) -> f64 {
            1.0
        }
        fn position(&self) -> CoordinateVector {
            CoordinateVector::new(vec![(0, self.value)])
        }
        fn create_offspring(&self, birth_generation: u32, ids: &IdGenerator, rng: &mut EvolutionRng) -> Self {
            Self {
                id: ids.next_id(),
                birth_generation,
                value: (self.value + rng.gaussian() * 0.1).max(0.0),
                info: EvaluationInfo::default(),
            }
        }
        fn create_offspring_with(
            &self,
            other: &Self,
            birth_generation: u32,
            ids: &IdGenerator,
            _rng: &mut EvolutionRng,
        ) -> Self {
            Self {
                id: ids.next_id(),
                birth_generation,
                value: (self.value + other.value) / 2.0,
                info: EvaluationInfo::default(),
            }
        }
    }

    pub(crate) struct ScalarDecoder;

    impl GenomeDecoder<ScalarGenome> for ScalarDecoder {
        type Phenome = f64;

        fn decode(&self, genome: &ScalarGenome) -> Option<f64> {
            genome.value.is_finite().then_some(genome.value)
        }
    }

    /// Random values in [0, 1).
    pub(crate) struct ScalarFactory {
        pub ids: IdGenerator,
    }

    impl ScalarFactory {
        pub(crate) fn new() -> Self {
            Self {
                ids: IdGenerator::new(),
            }
        }
    }

    impl GenomeFactory<ScalarGenome> for ScalarFactory {
        fn id_generator(&self) -> &IdGenerator {
            &self.ids
        }
        fn create_genome(&self, id: GenomeId, birth_generation: u32, rng: &mut EvolutionRng) -> ScalarGenome {
            ScalarGenome {
                birth_generation,
                ..ScalarGenome::new(id, rng.uniform((0.0, 1.0)))
            }
        }
        fn create_genome_copy(&self, genome: &ScalarGenome, birth_generation: u32) -> ScalarGenome {
            ScalarGenome {
                birth_generation,
                ..ScalarGenome::new(self.ids.next_id(), genome.value)
            }
        }
    }

    /// Fitness is the value; viable when at least `threshold`.
    pub(crate) struct ScalarEvaluator {
        pub threshold: f64,
        pub stop_at: f64,
        pub partners: usize,
        /// Calls to `refresh_population_criteria`.
        pub refreshes: usize,
    }

    impl PhenomeEvaluator for ScalarEvaluator {
        type Phenome = f64;
        type Partner = f64;

        fn run_trial(&self, phenome: &f64, _generation: u32) -> TrialResult {
            TrialResult {
                fitness: *phenome,
                aux_fitness: vec![self.partners as f64],
                behavior: vec![*phenome],
                satisfies_minimal_criteria: *phenome >= self.threshold,
                stop_condition: *phenome >= self.stop_at,
            }
        }

        fn update_evaluation_baseline(&mut self, partners: Vec<Arc<f64>>, _generation: u32) {
            self.partners = partners.len();
        }

        fn refresh_population_criteria(&mut self, _behaviors: &[Vec<f64>]) {
            self.refreshes += 1;
        }
    }

    pub(crate) fn scalar_evaluator(
        config: &EvaluationConfig,
    ) -> GenomeEvaluator<ScalarGenome, ScalarDecoder, ScalarEvaluator> {
        GenomeEvaluator::new(
            ScalarDecoder,
            ScalarEvaluator {
                threshold: 0.5,
                stop_at: f64::INFINITY,
                partners: 0,
                refreshes: 0,
            },
            config,
        )
        .unwrap()
    }

    fn genomes(values: &[f64]) -> Vec<ScalarGenome> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| ScalarGenome::new(i as u64, v))
            .collect()
    }

    #[test]
    fn test_counter_increments_once_per_evaluation() {
        let evaluator = scalar_evaluator(&EvaluationConfig::default());
        let mut population = genomes(&[0.1, 0.6, 0.9]);

        evaluator.evaluate(&mut population, 0);
        assert_eq!(evaluator.evaluation_count(), 3);
        assert!(population[1].info.is_viable());
        assert!(!population[0].info.is_viable());
        assert_eq!(population[2].info.fitness, 0.9);

        evaluator.rescore(&mut population, 1);
        assert_eq!(evaluator.evaluation_count(), 3);
        assert!(population.iter().all(|g| g.info.evaluation_count == 1));
    }

    #[test]
    fn test_rescore_does_not_latch_stop_condition() {
        let mut evaluator = scalar_evaluator(&EvaluationConfig::default());
        evaluator.evaluator_mut().stop_at = 0.8;
        let mut population = genomes(&[0.1]);

        evaluator.evaluate(&mut population, 0);
        assert!(!evaluator.stop_condition_satisfied());

        population[0].value = 0.9;
        evaluator.rescore(&mut population, 1);
        assert_eq!(evaluator.evaluation_count(), 1);
        assert_eq!(population[0].info.fitness, 0.9);
        assert!(!evaluator.stop_condition_satisfied());

        evaluator.evaluate(&mut population, 2);
        assert!(evaluator.stop_condition_satisfied());
    }

    #[test]
    fn test_undecodable_genome_is_non_viable() {
        let evaluator = scalar_evaluator(&EvaluationConfig::default());
        let mut population = genomes(&[f64::NAN]);
        evaluator.evaluate(&mut population, 0);

        let info = &population[0].info;
        assert_eq!(info.fitness, 0.0);
        assert!(info.behavior.is_empty());
        assert_eq!(info.viable, Some(false));
        assert_eq!(evaluator.evaluation_count(), 1);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let serial = scalar_evaluator(&EvaluationConfig::default());
        let parallel = scalar_evaluator(&EvaluationConfig {
            parallelism: Parallelism::Parallel { threads: 3 },
            ..Default::default()
        });
        let values: Vec<f64> = (0..50).map(|i| i as f64 / 50.0).collect();
        let mut a = genomes(&values);
        let mut b = genomes(&values);
        serial.evaluate(&mut a, 0);
        parallel.evaluate(&mut b, 0);

        assert_eq!(parallel.evaluation_count(), 50);
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.info, y.info);
        }
    }

    #[test]
    fn test_once_only_skips_evaluated() {
        let evaluator = scalar_evaluator(&EvaluationConfig {
            selection: EvaluationSelection::OnceOnly,
            ..Default::default()
        });
        let mut population = genomes(&[0.2, 0.7]);
        evaluator.evaluate(&mut population, 0);
        evaluator.evaluate(&mut population, 1);

        assert_eq!(evaluator.evaluation_count(), 2);
        assert!(population.iter().all(|g| g.info.skip_count == 1));
    }

    #[test]
    fn test_periodic_selection() {
        let evaluator = scalar_evaluator(&EvaluationConfig {
            selection: EvaluationSelection::Periodic { period: 3 },
            ..Default::default()
        });
        let mut population = genomes(&[0.5]);
        for generation in 0..6 {
            evaluator.evaluate(&mut population, generation);
        }
        assert_eq!(population[0].info.evaluation_count, 2);
        assert_eq!(population[0].info.skip_count, 4);
    }

    #[test]
    fn test_stop_condition_latches() {
        let mut evaluator = GenomeEvaluator::new(
            ScalarDecoder,
            ScalarEvaluator {
                threshold: 0.0,
                stop_at: 0.8,
                partners: 0,
                refreshes: 0,
            },
            &EvaluationConfig::default(),
        )
        .unwrap();
        let mut population = genomes(&[0.9]);
        evaluator.evaluate(&mut population, 0);
        assert!(evaluator.stop_condition_satisfied());

        let mut low = genomes(&[0.1]);
        evaluator.evaluate(&mut low, 1);
        assert!(evaluator.stop_condition_satisfied());

        evaluator.reset();
        assert!(!evaluator.stop_condition_satisfied());
        assert_eq!(evaluator.evaluation_count(), 0);
    }

    #[test]
    fn test_phenome_cache_pruned_to_live_population() {
        let evaluator = scalar_evaluator(&EvaluationConfig {
            phenome_caching: true,
            ..Default::default()
        });
        let mut population = genomes(&[0.1, 0.2, 0.3]);
        evaluator.evaluate(&mut population, 0);
        assert_eq!(evaluator.cached_phenomes(), 3);

        population.remove(0);
        evaluator.prune_cache(&population);
        assert_eq!(evaluator.cached_phenomes(), 2);
    }

    #[test]
    fn test_baseline_reaches_domain_evaluator() {
        let mut evaluator = scalar_evaluator(&EvaluationConfig::default());
        evaluator.update_evaluation_baseline(vec![Arc::new(1.0), Arc::new(2.0)], 0);
        let mut population = genomes(&[0.5]);
        evaluator.evaluate(&mut population, 0);
        assert_eq!(population[0].info.aux_fitness, vec![2.0]);
    }

    #[test]
    fn test_novelty_fitness_uses_nearest_neighbours() {
        let mut evaluator = scalar_evaluator(&EvaluationConfig {
            fitness: FitnessMode::Novelty {
                nearest_neighbors: 1,
            },
            ..Default::default()
        });
        let archive = Arc::new(NoveltyArchive::new(ArchiveConfig::default()));
        archive.test_and_add(100, &[10.0], 0);
        evaluator.set_archive(Some(archive));

        let mut population = genomes(&[0.0, 1.0, 3.0]);
        evaluator.evaluate(&mut population, 0);

        assert_eq!(population[0].info.fitness, 1.0);
        assert_eq!(population[1].info.fitness, 1.0);
        assert_eq!(population[2].info.fitness, 2.0);

        // Rescoring recomputes novelty without new trials
        evaluator.rescore(&mut population, 1);
        assert_eq!(evaluator.evaluation_count(), 3);
        assert_eq!(population[2].info.fitness, 2.0);
    }
}
