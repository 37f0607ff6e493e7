//! Speciation by k-means clustering in genetic space.
//!
//! Species reference genomes by index into the population list; they never
//! own genomes. After every speciation pass each genome belongs to exactly one
//! specie and no specie is empty.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::compute::genome::{CoordinateVector, EvolutionRng, Genome};
use crate::schema::SpeciationConfig;

/// A cluster of genomes.
#[derive(Debug, Clone, PartialEq)]
pub struct Specie {
    pub id: usize,
    /// Indices into the population, fittest first after [`Specie::sort_members`].
    pub members: Vec<usize>,
    pub centroid: CoordinateVector,
}

impl Specie {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn mean_fitness<G: Genome>(&self, population: &[G]) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members
            .iter()
            .map(|&i| population[i].fitness())
            .sum::<f64>()
            / self.members.len() as f64
    }

    /// Members with a strictly positive fitness.
    pub fn nonzero_fitness_count<G: Genome>(&self, population: &[G]) -> usize {
        self.members
            .iter()
            .filter(|&&i| population[i].fitness() > 0.0)
            .count()
    }

    /// Sort members fittest first; equal fitness puts the youngest first.
    pub fn sort_members<G: Genome>(&mut self, population: &[G]) {
        self.members
            .sort_by(|&a, &b| compare_fittest_first(&population[a], &population[b]));
    }

    /// First member; the champion once members are sorted.
    pub fn champion<'a, G: Genome>(&self, population: &'a [G]) -> Option<&'a G> {
        self.members.first().map(|&i| &population[i])
    }
}

/// Fitness descending, then birth generation descending.
pub fn compare_fittest_first<G: Genome>(a: &G, b: &G) -> Ordering {
    b.fitness()
        .partial_cmp(&a.fitness())
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.birth_generation().cmp(&a.birth_generation()))
}

/// Distance between genome positions.
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &CoordinateVector, b: &CoordinateVector) -> f64;

    /// Central position of a set of points.
    fn centroid(&self, points: &[&CoordinateVector]) -> CoordinateVector;
}

/// Manhattan distance with a penalty for genes present in only one vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ManhattanDistanceMetric {
    pub matching_coefficient: f64,
    pub mismatch_coefficient: f64,
    pub mismatch_constant: f64,
}

impl Default for ManhattanDistanceMetric {
    fn default() -> Self {
        Self::from_config(&SpeciationConfig::default())
    }
}

impl ManhattanDistanceMetric {
    pub fn from_config(config: &SpeciationConfig) -> Self {
        Self {
            matching_coefficient: config.matching_coefficient,
            mismatch_coefficient: config.mismatch_coefficient,
            mismatch_constant: config.mismatch_constant,
        }
    }

    fn mismatch(&self, value: f64) -> f64 {
        self.mismatch_coefficient * value.abs() + self.mismatch_constant
    }
}

impl DistanceMetric for ManhattanDistanceMetric {
    fn distance(&self, a: &CoordinateVector, b: &CoordinateVector) -> f64 {
        let (a, b) = (a.elements(), b.elements());
        let (mut i, mut j) = (0, 0);
        let mut distance = 0.0;

        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                Ordering::Equal => {
                    distance += self.matching_coefficient * (a[i].1 - b[j].1).abs();
                    i += 1;
                    j += 1;
                }
                Ordering::Less => {
                    distance += self.mismatch(a[i].1);
                    i += 1;
                }
                Ordering::Greater => {
                    distance += self.mismatch(b[j].1);
                    j += 1;
                }
            }
        }
        distance += a[i..].iter().map(|e| self.mismatch(e.1)).sum::<f64>();
        distance += b[j..].iter().map(|e| self.mismatch(e.1)).sum::<f64>();
        distance
    }

    /// Per-gene mean, treating absent genes as zero.
    fn centroid(&self, points: &[&CoordinateVector]) -> CoordinateVector {
        if points.is_empty() {
            return CoordinateVector::default();
        }
        let mut sums: BTreeMap<u64, f64> = BTreeMap::new();
        for point in points {
            for &(gene, value) in point.elements() {
                *sums.entry(gene).or_insert(0.0) += value;
            }
        }
        let n = points.len() as f64;
        CoordinateVector::new(sums.into_iter().map(|(g, s)| (g, s / n)).collect())
    }
}

/// Assigns genomes to species.
pub trait SpeciationStrategy: Send + Sync {
    /// Create `specie_count` species from scratch.
    fn initialize_speciation(
        &self,
        positions: &[CoordinateVector],
        specie_count: usize,
        rng: &mut EvolutionRng,
    ) -> Vec<Specie>;

    /// Reassign every genome, starting from the existing centroids.
    fn speciate_genomes(&self, positions: &[CoordinateVector], species: &mut [Specie]);
}

/// k-means clustering over a [`DistanceMetric`].
#[derive(Debug, Clone)]
pub struct KMeansClusteringStrategy<M> {
    metric: M,
    max_iterations: usize,
}

impl KMeansClusteringStrategy<ManhattanDistanceMetric> {
    pub fn from_config(config: &SpeciationConfig) -> Self {
        Self::new(
            ManhattanDistanceMetric::from_config(config),
            config.max_kmeans_iterations,
        )
    }
}

impl<M: DistanceMetric> KMeansClusteringStrategy<M> {
    pub fn new(metric: M, max_iterations: usize) -> Self {
        Self {
            metric,
            max_iterations,
        }
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Index of the nearest centroid; ties go to the earlier centroid.
    fn closest(&self, position: &CoordinateVector, centroids: &[CoordinateVector]) -> usize {
        let mut best = 0;
        let mut best_distance = f64::INFINITY;
        for (i, centroid) in centroids.iter().enumerate() {
            let d = self.metric.distance(position, centroid);
            if d < best_distance {
                best = i;
                best_distance = d;
            }
        }
        best
    }

    fn recompute_centroid(
        &self,
        positions: &[CoordinateVector],
        assignment: &[usize],
        specie: usize,
    ) -> Option<CoordinateVector> {
        let points: Vec<&CoordinateVector> = positions
            .iter()
            .zip(assignment)
            .filter(|(_, s)| **s == specie)
            .map(|(p, _)| p)
            .collect();
        (!points.is_empty()).then(|| self.metric.centroid(&points))
    }

    fn cluster(
        &self,
        positions: &[CoordinateVector],
        mut centroids: Vec<CoordinateVector>,
    ) -> Vec<(Vec<usize>, CoordinateVector)> {
        let k = centroids.len();
        let mut assignment: Vec<usize> = positions
            .iter()
            .map(|p| self.closest(p, &centroids))
            .collect();

        for _ in 0..self.max_iterations {
            for (s, centroid) in centroids.iter_mut().enumerate() {
                if let Some(c) = self.recompute_centroid(positions, &assignment, s) {
                    *centroid = c;
                }
            }
            let mut changed = false;
            for (i, position) in positions.iter().enumerate() {
                let nearest = self.closest(position, &centroids);
                if nearest != assignment[i] {
                    assignment[i] = nearest;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        self.fill_empty_species(positions, &mut assignment, &mut centroids);

        let mut clusters: Vec<(Vec<usize>, CoordinateVector)> = centroids
            .into_iter()
            .map(|c| (Vec::new(), c))
            .collect();
        for (i, &s) in assignment.iter().enumerate() {
            clusters[s].0.push(i);
        }
        for (s, cluster) in clusters.iter_mut().enumerate() {
            if let Some(c) = self.recompute_centroid(positions, &assignment, s) {
                cluster.1 = c;
            }
        }

        assert_eq!(clusters.len(), k);
        assert!(
            clusters.iter().all(|(members, _)| !members.is_empty()),
            "Speciation left an empty specie"
        );
        assert_eq!(
            clusters.iter().map(|(m, _)| m.len()).sum::<usize>(),
            positions.len(),
            "Speciation must cover the population exactly once"
        );
        clusters
    }

    /// Give each empty specie the genome farthest from its own centroid,
    /// taken from species with more than one member.
    fn fill_empty_species(
        &self,
        positions: &[CoordinateVector],
        assignment: &mut [usize],
        centroids: &mut [CoordinateVector],
    ) {
        for empty in 0..centroids.len() {
            let mut sizes = vec![0usize; centroids.len()];
            for &s in assignment.iter() {
                sizes[s] += 1;
            }
            if sizes[empty] > 0 {
                continue;
            }

            let mut donor: Option<(usize, f64)> = None;
            for (i, position) in positions.iter().enumerate() {
                let s = assignment[i];
                if sizes[s] < 2 {
                    continue;
                }
                let d = self.metric.distance(position, &centroids[s]);
                if donor.is_none_or(|(_, best)| d > best) {
                    donor = Some((i, d));
                }
            }
            let Some((genome, _)) = donor else {
                panic!("No specie has a member to spare for empty specie {empty}");
            };
            let from = assignment[genome];
            assignment[genome] = empty;
            centroids[empty] = positions[genome].clone();
            if let Some(c) = self.recompute_centroid(positions, assignment, from) {
                centroids[from] = c;
            }
        }
    }
}

impl<M: DistanceMetric> SpeciationStrategy for KMeansClusteringStrategy<M> {
    fn initialize_speciation(
        &self,
        positions: &[CoordinateVector],
        specie_count: usize,
        rng: &mut EvolutionRng,
    ) -> Vec<Specie> {
        let k = specie_count.min(positions.len());
        if k == 0 {
            return Vec::new();
        }
        let centroids = rng
            .sample_indices(positions.len(), k)
            .into_iter()
            .map(|i| positions[i].clone())
            .collect();

        self.cluster(positions, centroids)
            .into_iter()
            .enumerate()
            .map(|(id, (members, centroid))| Specie {
                id,
                members,
                centroid,
            })
            .collect()
    }

    fn speciate_genomes(&self, positions: &[CoordinateVector], species: &mut [Specie]) {
        assert!(
            positions.len() >= species.len(),
            "Cannot speciate {} genomes into {} species",
            positions.len(),
            species.len()
        );
        if species.is_empty() {
            return;
        }
        let centroids = species.iter().map(|s| s.centroid.clone()).collect();
        for (specie, (members, centroid)) in species.iter_mut().zip(self.cluster(positions, centroids)) {
            specie.members = members;
            specie.centroid = centroid;
        }
    }
}
