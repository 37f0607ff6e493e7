//! Coevolution of two populations that form each other's evaluation baseline.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::compute::error::EvolutionError;
use crate::compute::evaluation::{GenomeEvaluator, PhenomeEvaluator};
use crate::compute::evolution::{EvolutionAlgorithm, NoveltyArchive};
use crate::compute::genome::{Genome, GenomeDecoder, GenomeFactory};
use crate::schema::{
    CoevolutionConfig, CoevolutionResult, ConfigError, EvaluationBudget, GenerationSchedule,
    RunState, Side, StopReason,
};

/// Everything one side needs at initialization.
pub struct SideSetup<'a, G, D, E>
where
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    pub evaluator: GenomeEvaluator<G, D, E>,
    pub factory: &'a dyn GenomeFactory<G>,
    pub population: Vec<G>,
    pub archive: Option<NoveltyArchive>,
}

/// Owns both algorithms and drives them in lockstep.
///
/// The first side's evaluator is run against the second side's phenomes and
/// vice versa.
pub struct CoevolutionContainer<GA, DA, EA, GB, DB, EB>
where
    DA: GenomeDecoder<GA>,
    EA: PhenomeEvaluator<Phenome = DA::Phenome, Partner = DB::Phenome>,
    DB: GenomeDecoder<GB>,
    EB: PhenomeEvaluator<Phenome = DB::Phenome, Partner = DA::Phenome>,
{
    config: CoevolutionConfig,
    first: EvolutionAlgorithm<GA, DA, EA>,
    second: EvolutionAlgorithm<GB, DB, EB>,
    state: RunState,
    generation: u32,
    elapsed: Duration,
    pause_requested: Arc<AtomicBool>,
}

impl<GA, DA, EA, GB, DB, EB> CoevolutionContainer<GA, DA, EA, GB, DB, EB>
where
    GA: Genome,
    DA: GenomeDecoder<GA>,
    EA: PhenomeEvaluator<Phenome = DA::Phenome, Partner = DB::Phenome>,
    GB: Genome,
    DB: GenomeDecoder<GB>,
    EB: PhenomeEvaluator<Phenome = DB::Phenome, Partner = DA::Phenome>,
{
    pub fn new(
        config: CoevolutionConfig,
        first: EvolutionAlgorithm<GA, DA, EA>,
        second: EvolutionAlgorithm<GB, DB, EB>,
    ) -> Result<Self, EvolutionError> {
        if let GenerationSchedule::Batched { first, second } = config.schedule
            && (first == 0 || second == 0)
        {
            return Err(ConfigError::ZeroValue("schedule batch length").into());
        }
        Ok(Self {
            config,
            first,
            second,
            state: RunState::Uninitialized,
            generation: 0,
            elapsed: Duration::ZERO,
            pause_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Wire each side's seeds into the other side's baseline, then initialize
    /// both algorithms.
    pub fn initialize(
        &mut self,
        mut first: SideSetup<'_, GA, DA, EA>,
        mut second: SideSetup<'_, GB, DB, EB>,
    ) -> Result<(), EvolutionError> {
        if self.state != RunState::Uninitialized {
            return Err(EvolutionError::InvalidState(self.state));
        }

        let first_phenomes = first.evaluator.decode_population(&first.population);
        let second_phenomes = second.evaluator.decode_population(&second.population);
        first
            .evaluator
            .update_evaluation_baseline(second_phenomes, 0);
        second
            .evaluator
            .update_evaluation_baseline(first_phenomes, 0);

        self.first.initialize(
            first.evaluator,
            first.factory,
            first.population,
            None,
            None,
            first.archive,
        )?;
        self.second.initialize(
            second.evaluator,
            second.factory,
            second.population,
            None,
            None,
            second.archive,
        )?;

        // Steady-state sides may have grown past their seeds
        self.refresh_second_baseline()?;
        self.refresh_first_baseline()?;
        self.state = RunState::Ready;

        info!(
            "Coevolution initialized: {} first-side and {} second-side genomes",
            self.first.population().len(),
            self.second.population().len()
        );
        Ok(())
    }

    /// Whether every genome on both sides passes its minimal criteria against
    /// the other side. Runs uncounted trials.
    pub fn verify_seed_viability(&self) -> bool {
        let first = self.first.all_viable();
        let second = self.second.all_viable();
        if !first {
            warn!("First-side seeds are not all viable");
        }
        if !second {
            warn!("Second-side seeds are not all viable");
        }
        first && second
    }

    /// Run until a stop condition or a pause request.
    pub fn run(&mut self) -> Result<CoevolutionResult, EvolutionError> {
        match self.state {
            RunState::Ready | RunState::Paused => {}
            state => return Err(EvolutionError::InvalidState(state)),
        }
        self.state = RunState::Running;
        self.first.resume();
        self.second.resume();
        let started = Instant::now();

        let reason = loop {
            if let Some(reason) = self.stop_reason() {
                break reason;
            }
            if self.pause_requested.swap(false, Ordering::Relaxed) {
                break StopReason::Paused;
            }
            self.perform_one_generation()?;
        };
        self.elapsed += started.elapsed();

        if reason == StopReason::Paused {
            self.state = RunState::Paused;
            self.first.pause();
            self.second.pause();
            info!("Coevolution paused at generation {}", self.generation);
        } else {
            self.stop()?;
            info!(
                "Coevolution stopped at generation {}: {:?}",
                self.generation, reason
            );
        }
        Ok(self.result(reason))
    }

    /// Advance one container generation according to the schedule.
    pub fn perform_one_generation(&mut self) -> Result<(), EvolutionError> {
        let (first_steps, second_steps) = match self.config.schedule {
            GenerationSchedule::Alternating => (1, 1),
            GenerationSchedule::Batched { first, second } => (first, second),
        };

        for _ in 0..first_steps {
            self.first.perform_one_generation()?;
            self.refresh_second_baseline()?;
            if self.first.stop_condition_satisfied() {
                break;
            }
        }
        for _ in 0..second_steps {
            if self.first.stop_condition_satisfied() {
                break;
            }
            self.second.perform_one_generation()?;
            self.refresh_first_baseline()?;
            if self.second.stop_condition_satisfied() {
                break;
            }
        }

        self.generation += 1;
        debug!(
            "Coevolution generation {}: {} + {} evaluations",
            self.generation,
            self.first.evaluation_count(),
            self.second.evaluation_count()
        );
        Ok(())
    }

    fn refresh_first_baseline(&mut self) -> Result<(), EvolutionError> {
        let partners = self.second.decoded_population();
        self.first
            .update_evaluation_baseline(partners, self.second.generation())
    }

    fn refresh_second_baseline(&mut self) -> Result<(), EvolutionError> {
        let partners = self.first.decoded_population();
        self.second
            .update_evaluation_baseline(partners, self.first.generation())
    }

    /// Reason the run should stop now, excluding pause requests.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.first.stop_condition_satisfied() {
            return Some(StopReason::StopCondition(Side::First));
        }
        if self.second.stop_condition_satisfied() {
            return Some(StopReason::StopCondition(Side::Second));
        }
        if self
            .config
            .max_generations
            .is_some_and(|max| self.generation >= max)
        {
            return Some(StopReason::MaxGenerations);
        }
        if let Some(max) = self.config.max_evaluations {
            let first = self.first.evaluation_count();
            let second = self.second.evaluation_count();
            let spent = match self.config.evaluation_budget {
                EvaluationBudget::PerSide => first >= max || second >= max,
                EvaluationBudget::Summed => first + second >= max,
            };
            if spent {
                return Some(StopReason::MaxEvaluations);
            }
        }
        None
    }

    /// Stop both algorithms and close their loggers.
    pub fn stop(&mut self) -> Result<(), EvolutionError> {
        self.state = RunState::Stopped;
        self.first.stop()?;
        self.second.stop()
    }

    /// Shared flag that pauses [`run`](Self::run) between generations.
    pub fn pause_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pause_requested)
    }

    pub fn result(&self, stop_reason: StopReason) -> CoevolutionResult {
        CoevolutionResult {
            generations: self.generation,
            stop_reason,
            first: self.first.summary(),
            second: self.second.summary(),
            elapsed_seconds: self.elapsed.as_secs_f64(),
        }
    }

    pub fn first(&self) -> &EvolutionAlgorithm<GA, DA, EA> {
        &self.first
    }

    pub fn second(&self) -> &EvolutionAlgorithm<GB, DB, EB> {
        &self.second
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &CoevolutionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evaluation::tests::{
        ScalarDecoder, ScalarEvaluator, ScalarFactory, ScalarGenome, scalar_evaluator,
    };
    use crate::compute::genome::EvolutionRng;
    use crate::schema::{EvaluationConfig, EvolutionAlgorithmConfig};

    type Scalar = EvolutionAlgorithm<ScalarGenome, ScalarDecoder, ScalarEvaluator>;
    type Container = CoevolutionContainer<
        ScalarGenome,
        ScalarDecoder,
        ScalarEvaluator,
        ScalarGenome,
        ScalarDecoder,
        ScalarEvaluator,
    >;

    fn algorithm(seed: u64) -> Scalar {
        let config = EvolutionAlgorithmConfig {
            population_size: 10,
            batch_size: 2,
            specie_count: 2,
            asexual_proportion: 1.0,
            ..Default::default()
        };
        Scalar::new(config, seed).unwrap()
    }

    fn container(config: CoevolutionConfig, first_stop_at: f64, second_stop_at: f64) -> Container {
        let first_factory = ScalarFactory::new();
        let second_factory = ScalarFactory::new();
        let mut rng = EvolutionRng::new(21);
        let mut container = Container::new(config, algorithm(1), algorithm(2)).unwrap();

        let mut first_evaluator = scalar_evaluator(&EvaluationConfig::default());
        first_evaluator.evaluator_mut().stop_at = first_stop_at;
        let mut second_evaluator = scalar_evaluator(&EvaluationConfig::default());
        second_evaluator.evaluator_mut().stop_at = second_stop_at;

        container
            .initialize(
                SideSetup {
                    evaluator: first_evaluator,
                    factory: &first_factory,
                    population: first_factory.create_genome_list(10, 0, &mut rng),
                    archive: None,
                },
                SideSetup {
                    evaluator: second_evaluator,
                    factory: &second_factory,
                    population: second_factory.create_genome_list(4, 0, &mut rng),
                    archive: None,
                },
            )
            .unwrap();
        container
    }

    fn limited(max_generations: Option<u32>, max_evaluations: Option<u64>) -> CoevolutionConfig {
        CoevolutionConfig {
            max_generations,
            max_evaluations,
            ..Default::default()
        }
    }

    fn partners(algorithm: &Scalar) -> usize {
        algorithm.evaluator().unwrap().evaluator().partners
    }

    #[test]
    fn test_initialize_wires_filled_baselines() {
        let container = container(limited(Some(1), None), f64::INFINITY, f64::INFINITY);
        assert_eq!(container.state(), RunState::Ready);
        assert_eq!(container.second().population().len(), 10);
        assert_eq!(partners(container.first()), 10);
        assert_eq!(partners(container.second()), 10);
    }

    #[test]
    fn test_alternating_stops_at_max_generations() {
        let mut container = container(limited(Some(3), None), f64::INFINITY, f64::INFINITY);
        let result = container.run().unwrap();

        assert_eq!(result.stop_reason, StopReason::MaxGenerations);
        assert_eq!(result.generations, 3);
        assert_eq!(container.first().generation(), 3);
        assert_eq!(container.second().generation(), 3);
        assert_eq!(container.state(), RunState::Stopped);
        assert_eq!(result.first.population_size, 10);
    }

    #[test]
    fn test_batched_schedule() {
        let config = CoevolutionConfig {
            schedule: GenerationSchedule::Batched { first: 2, second: 1 },
            ..limited(Some(2), None)
        };
        let mut container = container(config, f64::INFINITY, f64::INFINITY);
        container.run().unwrap();
        assert_eq!(container.first().generation(), 4);
        assert_eq!(container.second().generation(), 2);
    }

    #[test]
    fn test_zero_batch_length_rejected() {
        let config = CoevolutionConfig {
            schedule: GenerationSchedule::Batched { first: 0, second: 1 },
            ..Default::default()
        };
        assert!(matches!(
            Container::new(config, algorithm(1), algorithm(2)),
            Err(EvolutionError::Config(ConfigError::ZeroValue(_)))
        ));
    }

    #[test]
    fn test_evaluation_budgets() {
        // 10 initial evaluations per side, then 2 per side per generation
        let per_side = CoevolutionConfig {
            evaluation_budget: EvaluationBudget::PerSide,
            ..limited(None, Some(30))
        };
        let result = container(per_side, f64::INFINITY, f64::INFINITY).run().unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxEvaluations);
        assert_eq!(result.generations, 10);

        let summed = CoevolutionConfig {
            evaluation_budget: EvaluationBudget::Summed,
            ..limited(None, Some(30))
        };
        let result = container(summed, f64::INFINITY, f64::INFINITY).run().unwrap();
        assert_eq!(result.stop_reason, StopReason::MaxEvaluations);
        assert_eq!(result.generations, 3);
    }

    #[test]
    fn test_stop_condition_names_side() {
        let mut container = container(limited(Some(50), None), f64::INFINITY, 0.0);
        let result = container.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::StopCondition(Side::Second));
        assert_eq!(result.generations, 0);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut container = container(limited(Some(2), None), f64::INFINITY, f64::INFINITY);
        container.pause_handle().store(true, Ordering::Relaxed);

        let paused = container.run().unwrap();
        assert_eq!(paused.stop_reason, StopReason::Paused);
        assert_eq!(container.state(), RunState::Paused);
        assert_eq!(container.first().state(), RunState::Paused);

        let resumed = container.run().unwrap();
        assert_eq!(resumed.stop_reason, StopReason::MaxGenerations);
        assert_eq!(resumed.generations, 2);
    }

    #[test]
    fn test_run_after_stop_rejected() {
        let mut container = container(limited(Some(1), None), f64::INFINITY, f64::INFINITY);
        container.run().unwrap();
        assert!(matches!(
            container.run(),
            Err(EvolutionError::InvalidState(RunState::Stopped))
        ));
    }

    fn seeded(first: &[f64], second: &[f64]) -> Container {
        let factory = ScalarFactory::new();
        let genomes = |values: &[f64]| -> Vec<ScalarGenome> {
            values
                .iter()
                .map(|&v| ScalarGenome::new(factory.ids.next_id(), v))
                .collect()
        };
        let mut container = Container::new(limited(Some(1), None), algorithm(3), algorithm(4)).unwrap();
        container
            .initialize(
                SideSetup {
                    evaluator: scalar_evaluator(&EvaluationConfig::default()),
                    factory: &factory,
                    population: genomes(first),
                    archive: None,
                },
                SideSetup {
                    evaluator: scalar_evaluator(&EvaluationConfig::default()),
                    factory: &factory,
                    population: genomes(second),
                    archive: None,
                },
            )
            .unwrap();
        container
    }

    #[test]
    fn test_verify_seed_viability() {
        let all_viable = [0.9; 10];
        assert!(seeded(&all_viable, &all_viable).verify_seed_viability());

        let mut one_failing = [0.9; 10];
        one_failing[4] = 0.1;
        assert!(!seeded(&all_viable, &one_failing).verify_seed_viability());
    }
}
