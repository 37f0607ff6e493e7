//! Point navigation: open-loop agents coevolving with circular targets.
//!
//! An agent is a list of step vectors walked from a fixed start; a target is a
//! goal circle. An agent solves a target when any waypoint of its path lies
//! inside the circle. Agents must solve enough targets, and targets must be
//! solved (and failed) by enough agents.

use std::io;
use std::sync::Arc;

use crate::compute::{
    BehaviorCharacterization, CoordinateVector, EvaluationInfo, EvolutionRng, Genome,
    GenomeDecoder, GenomeFactory, GenomeId, IdGenerator, MinimalCriteria, PhenomeEvaluator,
    TrialResult, blend, euclidean,
};
use crate::logging::{DataLogger, LoggableElement};
use crate::schema::{BehaviorCharacterizationKind, BehaviorConfig, NavigationConfig};

/// Step-vector genome of one navigator.
#[derive(Debug, Clone)]
pub struct AgentGenome {
    id: GenomeId,
    birth_generation: u32,
    steps: Vec<(f64, f64)>,
    info: EvaluationInfo,
    config: Arc<NavigationConfig>,
}

impl AgentGenome {
    pub fn new(
        id: GenomeId,
        birth_generation: u32,
        steps: Vec<(f64, f64)>,
        config: Arc<NavigationConfig>,
    ) -> Self {
        Self {
            id,
            birth_generation,
            steps,
            info: EvaluationInfo::default(),
            config,
        }
    }

    pub fn steps(&self) -> &[(f64, f64)] {
        &self.steps
    }

    fn random_step(config: &NavigationConfig, rng: &mut EvolutionRng) -> (f64, f64) {
        let bounds = (-config.max_step_length, config.max_step_length);
        (rng.uniform(bounds), rng.uniform(bounds))
    }
}

impl Genome for AgentGenome {
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
        self.steps.len() as f64
    }

    fn position(&self) -> CoordinateVector {
        CoordinateVector::new(
            self.steps
                .iter()
                .enumerate()
                .flat_map(|(i, &(dx, dy))| [(2 * i as u64, dx), (2 * i as u64 + 1, dy)])
                .collect(),
        )
    }

    fn create_offspring(&self, birth_generation: u32, ids: &IdGenerator, rng: &mut EvolutionRng) -> Self {
        let config = &self.config;
        let bounds = (-config.max_step_length, config.max_step_length);
        let mut steps: Vec<(f64, f64)> = self
            .steps
            .iter()
            .map(|&(dx, dy)| {
                (
                    rng.gaussian_mutate(dx, config.step_mutation_strength, bounds),
                    rng.gaussian_mutate(dy, config.step_mutation_strength, bounds),
                )
            })
            .collect();
        if steps.len() < config.max_agent_steps && rng.is_hit(config.add_step_probability) {
            steps.push(Self::random_step(config, rng));
        }
        if steps.len() > 1 && rng.is_hit(config.remove_step_probability) {
            let index = rng.index(steps.len());
            steps.remove(index);
        }
        Self::new(ids.next_id(), birth_generation, steps, Arc::clone(config))
    }

    /// One-point crossover: a prefix of this path followed by the other's suffix.
    fn create_offspring_with(
        &self,
        other: &Self,
        birth_generation: u32,
        ids: &IdGenerator,
        rng: &mut EvolutionRng,
    ) -> Self {
        let cut = rng.index(self.steps.len() + 1);
        let mut steps: Vec<(f64, f64)> = self.steps[..cut].to_vec();
        steps.extend(other.steps.iter().skip(cut));
        steps.truncate(self.config.max_agent_steps);
        if steps.is_empty() {
            steps.push(Self::random_step(&self.config, rng));
        }
        Self::new(ids.next_id(), birth_generation, steps, Arc::clone(&self.config))
    }
}

/// Goal circle genome.
#[derive(Debug, Clone)]
pub struct TargetGenome {
    id: GenomeId,
    birth_generation: u32,
    goal: (f64, f64),
    radius: f64,
    info: EvaluationInfo,
    config: Arc<NavigationConfig>,
}

impl TargetGenome {
    pub fn new(
        id: GenomeId,
        birth_generation: u32,
        goal: (f64, f64),
        radius: f64,
        config: Arc<NavigationConfig>,
    ) -> Self {
        Self {
            id,
            birth_generation,
            goal,
            radius,
            info: EvaluationInfo::default(),
            config,
        }
    }

    pub fn goal(&self) -> (f64, f64) {
        self.goal
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Genome for TargetGenome {
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

    /// Distance from the start relative to the goal's size.
    fn complexity(&self) -> f64 {
        let (sx, sy) = self.config.start;
        euclidean(&[sx, sy], &[self.goal.0, self.goal.1]) / self.radius
    }

    fn position(&self) -> CoordinateVector {
        CoordinateVector::new(vec![(0, self.goal.0), (1, self.goal.1), (2, self.radius)])
    }

    fn create_offspring(&self, birth_generation: u32, ids: &IdGenerator, rng: &mut EvolutionRng) -> Self {
        let config = &self.config;
        let arena = (-config.arena_extent, config.arena_extent);
        let strength = config.goal_mutation_strength;
        let goal = (
            rng.gaussian_mutate(self.goal.0, strength, arena),
            rng.gaussian_mutate(self.goal.1, strength, arena),
        );
        let radius = rng.gaussian_mutate(self.radius, strength, config.target_radius_bounds);
        Self::new(ids.next_id(), birth_generation, goal, radius, Arc::clone(config))
    }

    fn create_offspring_with(
        &self,
        other: &Self,
        birth_generation: u32,
        ids: &IdGenerator,
        rng: &mut EvolutionRng,
    ) -> Self {
        let t = rng.unit();
        let goal = (
            blend(self.goal.0, other.goal.0, t),
            blend(self.goal.1, other.goal.1, t),
        );
        let radius = blend(self.radius, other.radius, t);
        Self::new(ids.next_id(), birth_generation, goal, radius, Arc::clone(&self.config))
    }
}

/// Waypoints of a decoded agent, starting at the start position.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentPath {
    pub waypoints: Vec<(f64, f64)>,
}

impl AgentPath {
    /// Distance between the path's closest waypoint and the target's edge.
    /// Zero when the path enters the target.
    pub fn gap(&self, target: &Target) -> f64 {
        self.waypoints
            .iter()
            .map(|&(x, y)| (euclidean(&[x, y], &[target.goal.0, target.goal.1]) - target.radius).max(0.0))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn solves(&self, target: &Target) -> bool {
        self.gap(target) == 0.0
    }
}

/// Decoded goal circle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub goal: (f64, f64),
    pub radius: f64,
}

/// Walks an agent's steps from the start, clamped to the arena.
#[derive(Debug, Clone)]
pub struct AgentDecoder {
    start: (f64, f64),
    arena_extent: f64,
}

impl AgentDecoder {
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            start: config.start,
            arena_extent: config.arena_extent,
        }
    }
}

impl GenomeDecoder<AgentGenome> for AgentDecoder {
    type Phenome = AgentPath;

    fn decode(&self, genome: &AgentGenome) -> Option<AgentPath> {
        if genome.steps.is_empty() {
            return None;
        }
        let extent = self.arena_extent;
        let mut position = self.start;
        let mut waypoints = Vec::with_capacity(genome.steps.len() + 1);
        waypoints.push(position);
        for &(dx, dy) in &genome.steps {
            if !dx.is_finite() || !dy.is_finite() {
                return None;
            }
            position = (
                (position.0 + dx).clamp(-extent, extent),
                (position.1 + dy).clamp(-extent, extent),
            );
            waypoints.push(position);
        }
        Some(AgentPath { waypoints })
    }
}

/// Rejects degenerate circles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetDecoder;

impl GenomeDecoder<TargetGenome> for TargetDecoder {
    type Phenome = Target;

    fn decode(&self, genome: &TargetGenome) -> Option<Target> {
        let valid = genome.radius.is_finite()
            && genome.radius > 0.0
            && genome.goal.0.is_finite()
            && genome.goal.1.is_finite();
        valid.then_some(Target {
            goal: genome.goal,
            radius: genome.radius,
        })
    }
}

/// Creates random agents of `initial_agent_steps` steps.
pub struct AgentFactory {
    config: Arc<NavigationConfig>,
    ids: IdGenerator,
}

impl AgentFactory {
    pub fn new(config: NavigationConfig) -> Self {
        Self::with_ids(config, IdGenerator::new())
    }

    pub fn with_ids(config: NavigationConfig, ids: IdGenerator) -> Self {
        Self {
            config: Arc::new(config),
            ids,
        }
    }
}

impl GenomeFactory<AgentGenome> for AgentFactory {
    fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    fn create_genome(&self, id: GenomeId, birth_generation: u32, rng: &mut EvolutionRng) -> AgentGenome {
        let steps = (0..self.config.initial_agent_steps)
            .map(|_| AgentGenome::random_step(&self.config, rng))
            .collect();
        AgentGenome::new(id, birth_generation, steps, Arc::clone(&self.config))
    }

    fn create_genome_copy(&self, genome: &AgentGenome, birth_generation: u32) -> AgentGenome {
        AgentGenome::new(
            self.ids.next_id(),
            birth_generation,
            genome.steps.clone(),
            Arc::clone(&self.config),
        )
    }
}

/// Creates targets `initial_goal_distance` away from the start in a random direction.
pub struct TargetFactory {
    config: Arc<NavigationConfig>,
    ids: IdGenerator,
}

impl TargetFactory {
    pub fn new(config: NavigationConfig) -> Self {
        Self::with_ids(config, IdGenerator::new())
    }

    pub fn with_ids(config: NavigationConfig, ids: IdGenerator) -> Self {
        Self {
            config: Arc::new(config),
            ids,
        }
    }
}

impl GenomeFactory<TargetGenome> for TargetFactory {
    fn id_generator(&self) -> &IdGenerator {
        &self.ids
    }

    fn create_genome(&self, id: GenomeId, birth_generation: u32, rng: &mut EvolutionRng) -> TargetGenome {
        let config = &self.config;
        let angle = rng.uniform((0.0, std::f64::consts::TAU));
        let extent = config.arena_extent;
        let goal = (
            (config.start.0 + config.initial_goal_distance * angle.cos()).clamp(-extent, extent),
            (config.start.1 + config.initial_goal_distance * angle.sin()).clamp(-extent, extent),
        );
        let radius = rng.uniform(config.target_radius_bounds);
        TargetGenome::new(id, birth_generation, goal, radius, Arc::clone(config))
    }

    fn create_genome_copy(&self, genome: &TargetGenome, birth_generation: u32) -> TargetGenome {
        TargetGenome::new(
            self.ids.next_id(),
            birth_generation,
            genome.goal,
            genome.radius,
            Arc::clone(&self.config),
        )
    }
}

/// Runs agents against the current targets.
///
/// Fitness is the sum over targets of `1 / (1 + gap)`; the minimal criterion
/// is solving `min_targets_solved` targets plus the optional behavior
/// criterion over the path.
pub struct AgentEvaluator {
    min_targets_solved: usize,
    characterization: BehaviorCharacterizationKind,
    minimal_criteria: Option<MinimalCriteria>,
    targets: Vec<Arc<Target>>,
}

impl AgentEvaluator {
    pub fn new(config: NavigationConfig, behavior: Option<BehaviorConfig>) -> Self {
        let behavior = behavior.unwrap_or_default();
        Self {
            min_targets_solved: config.min_targets_solved,
            characterization: behavior.characterization,
            minimal_criteria: behavior.minimal_criteria.as_ref().map(MinimalCriteria::from_config),
            targets: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[Arc<Target>] {
        &self.targets
    }

    pub fn minimal_criteria(&self) -> Option<&MinimalCriteria> {
        self.minimal_criteria.as_ref()
    }
}

impl PhenomeEvaluator for AgentEvaluator {
    type Phenome = AgentPath;
    type Partner = Target;

    fn run_trial(&self, path: &AgentPath, _generation: u32) -> TrialResult {
        let mut characterization =
            BehaviorCharacterization::new(self.characterization, self.minimal_criteria.clone());
        for &(x, y) in &path.waypoints {
            characterization.update_behaviors(&[x, y]);
        }

        let gaps: Vec<f64> = self.targets.iter().map(|t| path.gap(t)).collect();
        let solved = gaps.iter().filter(|&&gap| gap == 0.0).count();
        let fitness: f64 = gaps.iter().map(|gap| 1.0 / (1.0 + gap)).sum();

        TrialResult {
            fitness,
            aux_fitness: vec![solved as f64],
            behavior: characterization.behavior_vector().to_vec(),
            satisfies_minimal_criteria: solved >= self.min_targets_solved
                && characterization.is_minimal_criteria_satisfied(),
            stop_condition: false,
        }
    }

    fn initialize(&mut self, logger: &mut dyn DataLogger) -> io::Result<()> {
        logger.log_header(&trial_columns("targets_solved"))
    }

    fn log_trial(
        &self,
        logger: &mut dyn DataLogger,
        genome: GenomeId,
        result: &TrialResult,
        generation: u32,
    ) -> io::Result<()> {
        logger.log_row(&trial_row(genome, result, generation, "targets_solved"))
    }

    fn update_evaluation_baseline(&mut self, partners: Vec<Arc<Target>>, _generation: u32) {
        self.targets = partners;
    }

    /// Rebuild the population-centroid criterion from the agents' end points.
    fn refresh_population_criteria(&mut self, behaviors: &[Vec<f64>]) {
        if let Some(criteria) = &mut self.minimal_criteria {
            let end_points: Vec<Vec<f64>> = behaviors
                .iter()
                .filter(|b| b.len() >= 2)
                .map(|b| b[b.len() - 2..].to_vec())
                .collect();
            criteria.refresh_population_centroid(&end_points);
        }
    }
}

/// Runs targets against the current agents.
///
/// Viable when solved by at least `min_agents_solved` agents and failed by at
/// least `min_agents_failed`. Fitness is the solved fraction.
pub struct TargetEvaluator {
    min_agents_solved: usize,
    min_agents_failed: usize,
    agents: Vec<Arc<AgentPath>>,
}

impl TargetEvaluator {
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            min_agents_solved: config.min_agents_solved,
            min_agents_failed: config.min_agents_failed,
            agents: Vec::new(),
        }
    }

    pub fn agents(&self) -> &[Arc<AgentPath>] {
        &self.agents
    }
}

impl PhenomeEvaluator for TargetEvaluator {
    type Phenome = Target;
    type Partner = AgentPath;

    fn run_trial(&self, target: &Target, _generation: u32) -> TrialResult {
        let solved = self.agents.iter().filter(|a| a.solves(target)).count();
        let failed = self.agents.len() - solved;
        let fitness = if self.agents.is_empty() {
            0.0
        } else {
            solved as f64 / self.agents.len() as f64
        };

        TrialResult {
            fitness,
            aux_fitness: vec![solved as f64, failed as f64],
            behavior: vec![target.goal.0, target.goal.1, target.radius],
            satisfies_minimal_criteria: solved >= self.min_agents_solved
                && failed >= self.min_agents_failed,
            stop_condition: false,
        }
    }

    fn initialize(&mut self, logger: &mut dyn DataLogger) -> io::Result<()> {
        logger.log_header(&trial_columns("agents_solved"))
    }

    fn log_trial(
        &self,
        logger: &mut dyn DataLogger,
        genome: GenomeId,
        result: &TrialResult,
        generation: u32,
    ) -> io::Result<()> {
        logger.log_row(&trial_row(genome, result, generation, "agents_solved"))
    }

    fn update_evaluation_baseline(&mut self, partners: Vec<Arc<AgentPath>>, _generation: u32) {
        self.agents = partners;
    }
}

fn trial_columns(solved: &'static str) -> Vec<LoggableElement> {
    ["generation", "genome_id", "fitness", solved, "viable"]
        .into_iter()
        .map(LoggableElement::column)
        .collect()
}

/// The first auxiliary fitness value of both evaluators is the solved count.
fn trial_row(
    genome: GenomeId,
    result: &TrialResult,
    generation: u32,
    solved: &'static str,
) -> Vec<LoggableElement> {
    vec![
        LoggableElement::new("generation", generation),
        LoggableElement::new("genome_id", genome),
        LoggableElement::new("fitness", result.fitness),
        LoggableElement::new(solved, result.aux_fitness.first().copied().unwrap_or(0.0)),
        LoggableElement::new("viable", result.satisfies_minimal_criteria),
    ]
}
