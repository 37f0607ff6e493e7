//! Fitness-proportional (roulette wheel) selection.

use crate::compute::genome::EvolutionRng;

/// Probability layout over a fixed set of outcomes.
///
/// Negative and non-finite weights count as zero. When every remaining weight
/// is zero, spins fall back to a uniform draw over the outcomes that have not
/// been removed.
#[derive(Debug, Clone)]
pub struct RouletteWheelLayout {
    weights: Vec<f64>,
    removed: Vec<bool>,
    total: f64,
}

impl RouletteWheelLayout {
    pub fn new(weights: &[f64]) -> Self {
        let weights: Vec<f64> = weights
            .iter()
            .map(|&w| if w.is_finite() && w > 0.0 { w } else { 0.0 })
            .collect();
        let total = weights.iter().sum();
        Self {
            removed: vec![false; weights.len()],
            weights,
            total,
        }
    }

    /// Number of outcomes, including removed ones.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Outcomes that can still be drawn.
    pub fn available(&self) -> usize {
        self.removed.iter().filter(|r| !**r).count()
    }

    /// Copy of this layout with one outcome excluded.
    pub fn remove_outcome(&self, index: usize) -> Self {
        let mut layout = self.clone();
        layout.weights[index] = 0.0;
        layout.removed[index] = true;
        layout.total = layout.weights.iter().sum();
        layout
    }

    /// Draw an outcome index.
    pub fn spin(&self, rng: &mut EvolutionRng) -> usize {
        assert!(
            self.available() > 0,
            "Roulette wheel spun with no available outcomes"
        );

        if self.total <= 0.0 {
            let pick = rng.index(self.available());
            return self
                .removed
                .iter()
                .enumerate()
                .filter(|(_, r)| !**r)
                .nth(pick)
                .map(|(i, _)| i)
                .unwrap_or(0);
        }

        let target = rng.unit() * self.total;
        let mut accumulated = 0.0;
        let mut last_positive = 0;
        for (i, &w) in self.weights.iter().enumerate() {
            if w <= 0.0 {
                continue;
            }
            accumulated += w;
            last_positive = i;
            if target < accumulated {
                return i;
            }
        }
        // Rounding can leave the target just past the accumulated total
        last_positive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_weight_never_drawn() {
        let layout = RouletteWheelLayout::new(&[0.0, 1.0, 0.0, 3.0]);
        let mut rng = EvolutionRng::new(1);
        let mut counts = [0usize; 4];
        for _ in 0..4000 {
            counts[layout.spin(&mut rng)] += 1;
        }
        assert_eq!(counts[0], 0);
        assert_eq!(counts[2], 0);
        assert!(counts[3] > counts[1] * 2);
    }

    #[test]
    fn test_all_zero_falls_back_to_uniform() {
        let layout = RouletteWheelLayout::new(&[0.0, 0.0, -1.0]);
        let mut rng = EvolutionRng::new(2);
        let mut counts = [0usize; 3];
        for _ in 0..3000 {
            counts[layout.spin(&mut rng)] += 1;
        }
        assert!(counts.iter().all(|&c| c > 800));
    }

    #[test]
    fn test_remove_outcome() {
        let layout = RouletteWheelLayout::new(&[5.0, 1.0]).remove_outcome(0);
        let mut rng = EvolutionRng::new(3);
        for _ in 0..100 {
            assert_eq!(layout.spin(&mut rng), 1);
        }
        assert_eq!(layout.available(), 1);
        assert_eq!(layout.len(), 2);
    }

    #[test]
    fn test_removed_outcome_excluded_from_uniform_fallback() {
        let layout = RouletteWheelLayout::new(&[0.0, 0.0, 0.0]).remove_outcome(1);
        let mut rng = EvolutionRng::new(4);
        for _ in 0..200 {
            assert_ne!(layout.spin(&mut rng), 1);
        }
    }

    #[test]
    #[should_panic(expected = "no available outcomes")]
    fn test_spin_empty_panics() {
        let layout = RouletteWheelLayout::new(&[]);
        layout.spin(&mut EvolutionRng::new(0));
    }
}
