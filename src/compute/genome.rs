//! Genome contracts shared by every population.
//!
//! A genome is an evolvable unit with a unique id, a birth generation and the
//! evaluation results of its last trial. Decoding a genome into something that
//! can be evaluated (a phenome) is a pure operation behind [`GenomeDecoder`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::prelude::*;

/// Unique genome identifier.
pub type GenomeId = u64;

/// Results of the most recent evaluation of a genome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationInfo {
    /// Primary fitness (objective or novelty).
    pub fitness: f64,
    /// Auxiliary fitness components reported by the trial.
    pub aux_fitness: Vec<f64>,
    /// Behavior vector produced by the trial.
    pub behavior: Vec<f64>,
    /// Outcome of the minimal-criteria check; `None` until one has run.
    pub viable: Option<bool>,
    /// Number of counted evaluations.
    pub evaluation_count: u64,
    /// Number of evaluation passes that skipped this genome.
    pub skip_count: u64,
}

impl EvaluationInfo {
    /// Whether the last minimal-criteria check passed.
    pub fn is_viable(&self) -> bool {
        self.viable.unwrap_or(false)
    }

    /// Whether the genome has been through at least one evaluation.
    pub fn was_evaluated(&self) -> bool {
        self.evaluation_count > 0 || self.viable.is_some()
    }
}

/// Sparse position of a genome in genetic space, sorted by gene id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinateVector {
    elements: Vec<(u64, f64)>,
}

impl CoordinateVector {
    /// Build from `(gene_id, value)` pairs; pairs are sorted by gene id.
    pub fn new(mut elements: Vec<(u64, f64)>) -> Self {
        elements.sort_by_key(|&(id, _)| id);
        Self { elements }
    }

    pub fn elements(&self) -> &[(u64, f64)] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// An evolvable unit.
pub trait Genome: Clone + Send + Sync {
    fn id(&self) -> GenomeId;

    fn birth_generation(&self) -> u32;

    fn evaluation_info(&self) -> &EvaluationInfo;

    fn evaluation_info_mut(&mut self) -> &mut EvaluationInfo;

    /// Structural size of the genome (always non-negative).
    fn complexity(&self) -> f64;

    /// Position used by speciation distance metrics.
    fn position(&self) -> CoordinateVector;

    /// Asexual reproduction: a mutated copy with a fresh id.
    fn create_offspring(
        &self,
        birth_generation: u32,
        ids: &IdGenerator,
        rng: &mut EvolutionRng,
    ) -> Self;

    /// Sexual reproduction with a second parent.
    fn create_offspring_with(
        &self,
        other: &Self,
        birth_generation: u32,
        ids: &IdGenerator,
        rng: &mut EvolutionRng,
    ) -> Self;

    fn fitness(&self) -> f64 {
        self.evaluation_info().fitness
    }
}

/// Creates genomes of one type.
pub trait GenomeFactory<G: Genome>: Send + Sync {
    /// Shared id source for genomes, offspring and copies.
    fn id_generator(&self) -> &IdGenerator;

    /// Create a random genome with the given id.
    fn create_genome(&self, id: GenomeId, birth_generation: u32, rng: &mut EvolutionRng) -> G;

    /// Copy a genome under a fresh id with cleared evaluation info.
    fn create_genome_copy(&self, genome: &G, birth_generation: u32) -> G;

    /// Create `count` random genomes with consecutive fresh ids.
    fn create_genome_list(
        &self,
        count: usize,
        birth_generation: u32,
        rng: &mut EvolutionRng,
    ) -> Vec<G> {
        (0..count)
            .map(|_| {
                let id = self.id_generator().next_id();
                self.create_genome(id, birth_generation, rng)
            })
            .collect()
    }
}

/// Pure genome-to-phenome decoding. `None` means the genome cannot be expressed.
pub trait GenomeDecoder<G>: Send + Sync {
    type Phenome: Send + Sync;

    fn decode(&self, genome: &G) -> Option<Self::Phenome>;
}

/// Monotonic id source shared across threads and clones.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    next: Arc<AtomicU64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start numbering at `first`.
    pub fn starting_at(first: GenomeId) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next_id(&self) -> GenomeId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Seedable random source owned by one algorithm, initializer or container.
pub struct EvolutionRng {
    rng: StdRng,
}

impl EvolutionRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Uniform random in bounds (inclusive).
    pub fn uniform(&mut self, bounds: (f64, f64)) -> f64 {
        if bounds.0 >= bounds.1 {
            return bounds.0;
        }
        self.rng.gen_range(bounds.0..=bounds.1)
    }

    /// Uniform random in `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.rng.r#gen()
    }

    /// Standard normal sample.
    pub fn gaussian(&mut self) -> f64 {
        self.rng.sample(rand_distr::StandardNormal)
    }

    /// Gaussian mutation: add noise scaled to the bounds, then clamp.
    pub fn gaussian_mutate(&mut self, value: f64, strength: f64, bounds: (f64, f64)) -> f64 {
        let mutated = value + self.gaussian() * strength * (bounds.1 - bounds.0);
        mutated.clamp(bounds.0, bounds.1)
    }

    /// True with probability `probability` (clamped to `[0, 1]`).
    pub fn is_hit(&mut self, probability: f64) -> bool {
        self.rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len)
    }

    /// `amount` distinct indices in `0..len`, in random order.
    pub fn sample_indices(&mut self, len: usize, amount: usize) -> Vec<usize> {
        rand::seq::index::sample(&mut self.rng, len, amount.min(len)).into_vec()
    }

    /// Generate next u64 for seeding child RNGs.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// Linear blend between two values.
pub fn blend(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_generator_shared_between_clones() {
        let ids = IdGenerator::new();
        let other = ids.clone();
        assert_eq!(ids.next_id(), 0);
        assert_eq!(other.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_id_generator_unique_across_threads() {
        let ids = IdGenerator::starting_at(10);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = ids.clone();
                std::thread::spawn(move || (0..100).map(|_| ids.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(id >= 10);
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn test_rng_reproducible() {
        let mut a = EvolutionRng::new(7);
        let mut b = EvolutionRng::new(7);
        for _ in 0..10 {
            assert_eq!(a.next_seed(), b.next_seed());
        }
    }

    #[test]
    fn test_gaussian_mutate_stays_in_bounds() {
        let mut rng = EvolutionRng::new(42);
        for _ in 0..1000 {
            let v = rng.gaussian_mutate(0.5, 2.0, (0.0, 1.0));
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_sample_indices_distinct() {
        let mut rng = EvolutionRng::new(3);
        let picked = rng.sample_indices(10, 4);
        assert_eq!(picked.len(), 4);
        assert_eq!(picked.iter().collect::<HashSet<_>>().len(), 4);
        assert_eq!(rng.sample_indices(3, 5).len(), 3);
    }

    #[test]
    fn test_coordinate_vector_sorted() {
        let coords = CoordinateVector::new(vec![(3, 1.0), (1, 2.0), (2, 0.5)]);
        let ids: Vec<u64> = coords.elements().iter().map(|e| e.0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_evaluation_info_defaults() {
        let info = EvaluationInfo::default();
        assert_eq!(info.fitness, 0.0);
        assert!(!info.is_viable());
        assert!(!info.was_evaluated());
    }
}
