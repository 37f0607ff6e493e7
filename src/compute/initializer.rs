//! Seed search: evolve genomes that are viable against given partners.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::compute::error::{EvolutionError, InitializationError};
use crate::compute::evaluation::{GenomeEvaluator, PhenomeEvaluator};
use crate::compute::evolution::{EvolutionAlgorithm, NoveltyArchive};
use crate::compute::genome::{EvaluationInfo, EvolutionRng, Genome, GenomeDecoder, GenomeFactory, GenomeId};
use crate::schema::{
    EvaluationConfig, EvaluationSelection, FitnessMode, InitializerConfig, Parallelism, RunPhase,
    RunState,
};

/// Seeds found across a set of partners.
#[derive(Debug, Clone)]
pub struct SeedingReport<G> {
    /// Distinct seed genomes with cleared evaluation info.
    pub seeds: Vec<G>,
    /// Seeds credited to each partner, in partner order.
    pub partner_credits: Vec<usize>,
    /// Restarts spent over the whole seeding.
    pub restarts: u32,
    /// Evaluations spent over the whole seeding.
    pub evaluations: u64,
}

/// One-shot fitness- or novelty-driven search for viable seed genomes.
pub struct Initializer<G, D, E>
where
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    config: InitializerConfig,
    rng: EvolutionRng,
    evaluator: Option<GenomeEvaluator<G, D, E>>,
    restarts: u32,
    evaluations: u64,
}

impl<G, D, E> Initializer<G, D, E>
where
    G: Genome,
    D: GenomeDecoder<G>,
    E: PhenomeEvaluator<Phenome = D::Phenome>,
{
    pub fn new(
        config: InitializerConfig,
        decoder: D,
        evaluator: E,
        parallelism: Parallelism,
        seed: u64,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;
        let evaluation = EvaluationConfig {
            parallelism,
            phenome_caching: false,
            selection: EvaluationSelection::All,
            fitness: config.search,
        };
        let evaluator = GenomeEvaluator::new(decoder, evaluator, &evaluation)?;
        Ok(Self {
            config,
            rng: EvolutionRng::new(seed),
            evaluator: Some(evaluator),
            restarts: 0,
            evaluations: 0,
        })
    }

    /// Evolve until `required` distinct viable genomes not in `exclude` exist.
    ///
    /// Each attempt starts from a fresh random population and ends when its
    /// evaluation budget is spent; attempts are bounded by `max_restarts`.
    pub fn evolve_viable_genomes(
        &mut self,
        factory: &dyn GenomeFactory<G>,
        partner: Arc<E::Partner>,
        required: usize,
        exclude: &HashSet<GenomeId>,
    ) -> Result<Vec<G>, InitializationError> {
        if required == 0 {
            return Ok(Vec::new());
        }

        for attempt in 0..=self.config.max_restarts {
            let mut evaluator = self.take_evaluator()?;
            evaluator.reset();
            evaluator.update_evaluation_baseline(vec![Arc::clone(&partner)], 0);

            let population =
                factory.create_genome_list(self.config.algorithm.population_size, 0, &mut self.rng);
            let archive = matches!(self.config.search, FitnessMode::Novelty { .. })
                .then(|| NoveltyArchive::new(self.config.archive.clone()));
            let mut algorithm =
                EvolutionAlgorithm::new(self.config.algorithm.clone(), self.rng.next_seed())?
                    .with_phase(RunPhase::Initialization);
            algorithm.initialize(
                evaluator,
                factory,
                population,
                None,
                Some(self.config.max_evaluations_per_attempt),
                archive,
            )?;

            let found = loop {
                let viable: Vec<G> = algorithm
                    .viable_genomes()
                    .into_iter()
                    .filter(|g| !exclude.contains(&g.id()))
                    .take(required)
                    .cloned()
                    .collect();
                if viable.len() == required {
                    break Some(viable);
                }
                if algorithm.limit_reached().is_some() {
                    break None;
                }
                algorithm.perform_one_generation()?;
            };

            self.evaluations += algorithm.evaluation_count();
            debug!(
                "Seed attempt {} finished after {} generations and {} evaluations",
                attempt,
                algorithm.generation(),
                algorithm.evaluation_count()
            );
            self.evaluator = algorithm.into_evaluator();

            if let Some(mut seeds) = found {
                for seed in &mut seeds {
                    *seed.evaluation_info_mut() = EvaluationInfo::default();
                }
                return Ok(seeds);
            }
            if attempt < self.config.max_restarts {
                self.restarts += 1;
                warn!(
                    "Seed attempt {} exhausted its budget, restarting ({} of {})",
                    attempt,
                    attempt + 1,
                    self.config.max_restarts
                );
            }
        }

        Err(InitializationError::RestartsExhausted {
            partner: 0,
            required,
            restarts: self.config.max_restarts,
        })
    }

    /// Seed `num_agents` distinct genomes across `partners`.
    ///
    /// Each search against a partner evolves `num_agent_success_criteria`
    /// viable genomes and keeps as many as the partner may still take. Every
    /// partner first takes up to `min(resource_limit, num_agents / partners)`.
    /// Remaining slots are filled from randomly picked partners still under
    /// the resource limit. A genome already seeded is never added twice, so it
    /// takes no second slot. If every partner reaches the limit first, the
    /// partial set is returned.
    pub fn seed_agents(
        &mut self,
        factory: &dyn GenomeFactory<G>,
        partners: &[Arc<E::Partner>],
        num_agents: usize,
    ) -> Result<SeedingReport<G>, InitializationError> {
        if partners.is_empty() {
            return Err(InitializationError::NoPartners);
        }
        let limit = self.config.resource_limit;
        let quota = limit.min(num_agents / partners.len());
        let mut report = SeedingReport {
            seeds: Vec::with_capacity(num_agents),
            partner_credits: vec![0; partners.len()],
            restarts: 0,
            evaluations: 0,
        };

        for (index, partner) in partners.iter().enumerate() {
            self.seed_partner(factory, partner, index, quota, &mut report)?;
        }

        while report.seeds.len() < num_agents {
            let open: Vec<usize> = (0..partners.len())
                .filter(|&i| report.partner_credits[i] < limit)
                .collect();
            if open.is_empty() {
                warn!(
                    "Every partner reached the resource limit of {}; returning {} of {} seeds",
                    limit,
                    report.seeds.len(),
                    num_agents
                );
                break;
            }
            let index = open[self.rng.index(open.len())];
            let wanted = (num_agents - report.seeds.len()).min(limit - report.partner_credits[index]);
            debug!(
                "Continuing seed search on partner {} with {} of {} seeds in place",
                index,
                report.seeds.len(),
                num_agents
            );
            self.seed_partner(factory, &partners[index], index, wanted, &mut report)?;
        }

        report.restarts = self.restarts;
        report.evaluations = self.evaluations;
        info!(
            "Seeded {} genomes against {} partners with {} restarts and {} evaluations",
            report.seeds.len(),
            partners.len(),
            self.restarts,
            self.evaluations
        );
        Ok(report)
    }

    /// Run one success-criteria search for a partner and keep up to `count`
    /// new seeds, skipping genomes already seeded.
    fn seed_partner(
        &mut self,
        factory: &dyn GenomeFactory<G>,
        partner: &Arc<E::Partner>,
        index: usize,
        count: usize,
        report: &mut SeedingReport<G>,
    ) -> Result<(), InitializationError> {
        if count == 0 {
            return Ok(());
        }
        let seeded: HashSet<GenomeId> = report.seeds.iter().map(Genome::id).collect();
        let required = self.config.num_agent_success_criteria;
        let found = self
            .evolve_viable_genomes(factory, Arc::clone(partner), required, &seeded)
            .map_err(|e| with_partner(e, index))?;
        for genome in found.into_iter().take(count) {
            if !seeded.contains(&genome.id()) {
                report.partner_credits[index] += 1;
                report.seeds.push(genome);
            }
        }
        Ok(())
    }

    fn take_evaluator(&mut self) -> Result<GenomeEvaluator<G, D, E>, EvolutionError> {
        self.evaluator
            .take()
            .ok_or(EvolutionError::InvalidState(RunState::Stopped))
    }

    /// Restarts spent so far.
    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    /// Evaluations spent so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

fn with_partner(error: InitializationError, partner: usize) -> InitializationError {
    match error {
        InitializationError::RestartsExhausted {
            required, restarts, ..
        } => InitializationError::RestartsExhausted {
            partner,
            required,
            restarts,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::evaluation::tests::{ScalarDecoder, ScalarEvaluator, ScalarFactory, ScalarGenome};
    use crate::schema::{ArchiveConfig, EvolutionAlgorithmConfig};

    fn config() -> InitializerConfig {
        InitializerConfig {
            algorithm: EvolutionAlgorithmConfig {
                population_size: 10,
                batch_size: 5,
                specie_count: 2,
                ..Default::default()
            },
            max_evaluations_per_attempt: 50,
            max_restarts: 2,
            num_agent_success_criteria: 1,
            resource_limit: 1,
            ..Default::default()
        }
    }

    fn initializer(
        config: InitializerConfig,
        threshold: f64,
    ) -> Initializer<ScalarGenome, ScalarDecoder, ScalarEvaluator> {
        Initializer::new(
            config,
            ScalarDecoder,
            ScalarEvaluator {
                threshold,
                stop_at: f64::INFINITY,
                partners: 0,
                refreshes: 0,
            },
            Parallelism::Serial,
            9,
        )
        .unwrap()
    }

    fn partners(n: usize) -> Vec<Arc<f64>> {
        (0..n).map(|i| Arc::new(i as f64)).collect()
    }

    #[test]
    fn test_one_seed_per_partner_under_resource_limit() {
        let factory = ScalarFactory::new();
        let mut initializer = initializer(config(), 0.5);
        let report = initializer
            .seed_agents(&factory, &partners(5), 10)
            .unwrap();

        assert_eq!(report.seeds.len(), 5);
        let ids: HashSet<GenomeId> = report.seeds.iter().map(|g| g.id).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(report.partner_credits, vec![1; 5]);
        assert!(report.seeds.iter().all(|g| !g.info.was_evaluated()));
        assert!(report.seeds.iter().all(|g| g.value >= 0.5));
    }

    #[test]
    fn test_fill_phase_uses_partners_under_limit() {
        let factory = ScalarFactory::new();
        let config = InitializerConfig {
            resource_limit: 3,
            ..config()
        };
        let mut initializer = initializer(config, 0.5);
        // Quota 1 each, then one more from a partner under the limit
        let report = initializer
            .seed_agents(&factory, &partners(3), 4)
            .unwrap();

        assert_eq!(report.seeds.len(), 4);
        let ids: HashSet<GenomeId> = report.seeds.iter().map(|g| g.id).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(report.partner_credits.iter().sum::<usize>(), 4);
        assert!(report.partner_credits.iter().all(|&c| (1..=2).contains(&c)));
    }

    #[test]
    fn test_success_criteria_below_quota() {
        let factory = ScalarFactory::new();
        let config = InitializerConfig {
            resource_limit: 3,
            ..config()
        };
        let mut initializer = initializer(config, 0.5);
        // Quota 3 per partner, but every search stops at one success
        let report = initializer
            .seed_agents(&factory, &partners(2), 6)
            .unwrap();

        assert_eq!(report.seeds.len(), 6);
        assert_eq!(report.partner_credits, vec![3, 3]);
        // Six searches, each evaluating at least its initial population
        assert!(report.evaluations >= 60);
    }

    #[test]
    fn test_success_criteria_above_quota_takes_quota() {
        let factory = ScalarFactory::new();
        let config = InitializerConfig {
            num_agent_success_criteria: 3,
            ..config()
        };
        let mut initializer = initializer(config, 0.5);
        let report = initializer
            .seed_agents(&factory, &partners(2), 2)
            .unwrap();

        assert_eq!(report.seeds.len(), 2);
        assert_eq!(report.partner_credits, vec![1, 1]);
    }

    #[test]
    fn test_more_partners_than_agents() {
        let factory = ScalarFactory::new();
        let mut initializer = initializer(config(), 0.5);
        let report = initializer
            .seed_agents(&factory, &partners(4), 2)
            .unwrap();
        assert_eq!(report.seeds.len(), 2);
    }

    #[test]
    fn test_no_partners_rejected() {
        let factory = ScalarFactory::new();
        let mut initializer = initializer(config(), 0.5);
        assert!(matches!(
            initializer.seed_agents(&factory, &[], 3),
            Err(InitializationError::NoPartners)
        ));
    }

    #[test]
    fn test_restarts_bounded() {
        let factory = ScalarFactory::new();
        let mut initializer = initializer(config(), 100.0);
        let result = initializer.seed_agents(&factory, &partners(2), 2);

        assert!(matches!(
            result,
            Err(InitializationError::RestartsExhausted {
                partner: 0,
                required: 1,
                restarts: 2
            })
        ));
        assert_eq!(initializer.restarts(), 2);
        assert!(initializer.evaluations() >= 150);
    }

    #[test]
    fn test_excluded_genomes_not_returned() {
        let factory = ScalarFactory::new();
        let mut initializer = initializer(config(), 0.5);
        let first = initializer
            .evolve_viable_genomes(&factory, Arc::new(0.0), 3, &HashSet::new())
            .unwrap();
        let exclude: HashSet<GenomeId> = first.iter().map(|g| g.id).collect();
        let second = initializer
            .evolve_viable_genomes(&factory, Arc::new(0.0), 3, &exclude)
            .unwrap();
        assert!(second.iter().all(|g| !exclude.contains(&g.id)));
    }

    #[test]
    fn test_novelty_search_finds_seeds() {
        let factory = ScalarFactory::new();
        let config = InitializerConfig {
            search: FitnessMode::Novelty {
                nearest_neighbors: 3,
            },
            archive: ArchiveConfig {
                addition_threshold: 0.1,
                threshold_floor: 0.01,
                ..Default::default()
            },
            ..config()
        };
        let mut initializer = initializer(config, 0.5);
        let seeds = initializer
            .evolve_viable_genomes(&factory, Arc::new(0.0), 2, &HashSet::new())
            .unwrap();
        assert_eq!(seeds.len(), 2);
        assert!(seeds.iter().all(|g| g.value >= 0.5));
    }
}
