//! Per-generation population statistics.

use std::collections::VecDeque;
use std::time::Instant;

use crate::compute::evolution::speciation::Specie;
use crate::compute::genome::Genome;
use crate::schema::AlgorithmSummary;

/// Fixed-window moving average.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    values: VecDeque<f64>,
    total: f64,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            values: VecDeque::with_capacity(window.max(1)),
            total: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.window
            && let Some(oldest) = self.values.pop_front()
        {
            self.total -= oldest;
        }
        self.values.push_back(value);
        self.total += value;
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.total / self.values.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Running statistics of one evolution algorithm.
#[derive(Debug, Clone)]
pub struct AlgorithmStats {
    pub generation: u32,
    pub total_evaluations: u64,
    pub evaluations_per_second: f64,
    pub total_offspring: u64,

    pub population_size: usize,
    pub viable_count: usize,
    pub max_fitness: f64,
    pub mean_fitness: f64,
    pub mean_specie_champion_fitness: f64,

    pub min_complexity: f64,
    pub max_complexity: f64,
    pub mean_complexity: f64,

    pub specie_count: usize,
    pub min_specie_size: usize,
    pub max_specie_size: usize,

    pub best_fitness_ma: MovingAverage,
    pub prev_best_fitness_ma: f64,
    pub specie_champion_fitness_ma: MovingAverage,
    pub prev_specie_champion_fitness_ma: f64,
    pub complexity_ma: MovingAverage,
    pub prev_complexity_ma: f64,

    last_clock: Instant,
    last_evaluations: u64,
}

impl AlgorithmStats {
    pub fn new(moving_average_window: usize) -> Self {
        Self {
            generation: 0,
            total_evaluations: 0,
            evaluations_per_second: 0.0,
            total_offspring: 0,
            population_size: 0,
            viable_count: 0,
            max_fitness: 0.0,
            mean_fitness: 0.0,
            mean_specie_champion_fitness: 0.0,
            min_complexity: 0.0,
            max_complexity: 0.0,
            mean_complexity: 0.0,
            specie_count: 0,
            min_specie_size: 0,
            max_specie_size: 0,
            best_fitness_ma: MovingAverage::new(moving_average_window),
            prev_best_fitness_ma: 0.0,
            specie_champion_fitness_ma: MovingAverage::new(moving_average_window),
            prev_specie_champion_fitness_ma: 0.0,
            complexity_ma: MovingAverage::new(moving_average_window),
            prev_complexity_ma: 0.0,
            last_clock: Instant::now(),
            last_evaluations: 0,
        }
    }

    /// Recompute everything from the current population and species.
    ///
    /// Species must have sorted members so their first member is the champion.
    pub fn update<G: Genome>(
        &mut self,
        generation: u32,
        total_evaluations: u64,
        population: &[G],
        species: &[Specie],
    ) {
        self.generation = generation;
        self.total_evaluations = total_evaluations;

        let elapsed = self.last_clock.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let evaluations = total_evaluations.saturating_sub(self.last_evaluations);
            self.evaluations_per_second = evaluations as f64 / elapsed;
        }
        self.last_clock = Instant::now();
        self.last_evaluations = total_evaluations;

        self.population_size = population.len();
        self.viable_count = population
            .iter()
            .filter(|g| g.evaluation_info().is_viable())
            .count();

        if population.is_empty() {
            self.max_fitness = 0.0;
            self.mean_fitness = 0.0;
            self.min_complexity = 0.0;
            self.max_complexity = 0.0;
            self.mean_complexity = 0.0;
        } else {
            let n = population.len() as f64;
            self.max_fitness = population
                .iter()
                .map(|g| g.fitness())
                .fold(f64::NEG_INFINITY, f64::max);
            self.mean_fitness = population.iter().map(|g| g.fitness()).sum::<f64>() / n;
            self.min_complexity = population
                .iter()
                .map(|g| g.complexity())
                .fold(f64::INFINITY, f64::min);
            self.max_complexity = population
                .iter()
                .map(|g| g.complexity())
                .fold(f64::NEG_INFINITY, f64::max);
            self.mean_complexity = population.iter().map(|g| g.complexity()).sum::<f64>() / n;
        }

        self.specie_count = species.len();
        self.min_specie_size = species.iter().map(Specie::len).min().unwrap_or(0);
        self.max_specie_size = species.iter().map(Specie::len).max().unwrap_or(0);
        self.mean_specie_champion_fitness = if species.is_empty() {
            0.0
        } else {
            species
                .iter()
                .filter_map(|s| s.champion(population))
                .map(|g| g.fitness())
                .sum::<f64>()
                / species.len() as f64
        };

        self.prev_best_fitness_ma = self.best_fitness_ma.mean();
        self.best_fitness_ma.push(self.max_fitness);
        self.prev_specie_champion_fitness_ma = self.specie_champion_fitness_ma.mean();
        self.specie_champion_fitness_ma
            .push(self.mean_specie_champion_fitness);
        self.prev_complexity_ma = self.complexity_ma.mean();
        self.complexity_ma.push(self.mean_complexity);
    }

    /// Serializable snapshot.
    pub fn summary(&self, champion_id: Option<u64>) -> AlgorithmSummary {
        AlgorithmSummary {
            generation: self.generation,
            total_evaluations: self.total_evaluations,
            evaluations_per_second: self.evaluations_per_second,
            total_offspring: self.total_offspring,
            population_size: self.population_size,
            viable_count: self.viable_count,
            specie_count: self.specie_count,
            min_specie_size: self.min_specie_size,
            max_specie_size: self.max_specie_size,
            champion_id,
            champion_fitness: self.max_fitness,
            mean_fitness: self.mean_fitness,
            mean_specie_champion_fitness: self.mean_specie_champion_fitness,
            min_complexity: self.min_complexity,
            max_complexity: self.max_complexity,
            mean_complexity: self.mean_complexity,
            best_fitness_moving_average: self.best_fitness_ma.mean(),
            complexity_moving_average: self.complexity_ma.mean(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moving_average_window() {
        let mut ma = MovingAverage::new(3);
        assert_eq!(ma.mean(), 0.0);
        for v in [1.0, 2.0, 3.0, 10.0] {
            ma.push(v);
        }
        assert_eq!(ma.len(), 3);
        assert_eq!(ma.mean(), 5.0);
    }

    #[test]
    fn test_zero_window_treated_as_one() {
        let mut ma = MovingAverage::new(0);
        ma.push(4.0);
        ma.push(6.0);
        assert_eq!(ma.mean(), 6.0);
    }
}
