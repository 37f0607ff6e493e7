//! Novelty archive with an adaptive addition threshold.
//!
//! Candidates are archived when their behavior is farther than the current
//! threshold from every archived behavior. Test-and-add is mutex-guarded so
//! parallel evaluation can share one archive; the threshold itself only
//! adapts in [`NoveltyArchive::update_parameters`], at generation boundaries.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::compute::behavior::euclidean;
use crate::compute::genome::GenomeId;
use crate::schema::ArchiveConfig;

/// An archived behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    pub genome_id: GenomeId,
    pub behavior: Vec<f64>,
    pub generation: u32,
}

#[derive(Debug)]
struct ArchiveState {
    entries: Vec<ArchiveEntry>,
    threshold: f64,
    additions_since_update: usize,
    updates_without_addition: u32,
}

/// Growing, threshold-gated set of behaviors.
#[derive(Debug)]
pub struct NoveltyArchive {
    config: ArchiveConfig,
    state: Mutex<ArchiveState>,
}

impl NoveltyArchive {
    pub fn new(config: ArchiveConfig) -> Self {
        let threshold = config.addition_threshold.max(config.threshold_floor);
        Self {
            config,
            state: Mutex::new(ArchiveState {
                entries: Vec::new(),
                threshold,
                additions_since_update: 0,
                updates_without_addition: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Archive `behavior` if it is novel enough. Empty behaviors are never archived.
    pub fn test_and_add(&self, genome_id: GenomeId, behavior: &[f64], generation: u32) -> bool {
        if behavior.is_empty() {
            return false;
        }
        let mut state = self.state();
        let nearest = state
            .entries
            .iter()
            .map(|e| euclidean(&e.behavior, behavior))
            .fold(f64::INFINITY, f64::min);
        if nearest <= state.threshold {
            return false;
        }
        state.entries.push(ArchiveEntry {
            genome_id,
            behavior: behavior.to_vec(),
            generation,
        });
        state.additions_since_update += 1;
        true
    }

    /// Adapt the threshold to the additions since the previous update.
    ///
    /// Raised when more than `max_generational_additions` were archived;
    /// lowered (never below the floor) after `max_generations_without_addition`
    /// consecutive updates with no additions.
    pub fn update_parameters(&self) {
        let mut state = self.state();
        let additions = state.additions_since_update;
        if additions > self.config.max_generational_additions {
            state.threshold *= self.config.threshold_increase_multiplier;
            state.updates_without_addition = 0;
        } else if additions == 0 {
            state.updates_without_addition += 1;
            if state.updates_without_addition >= self.config.max_generations_without_addition {
                state.threshold = (state.threshold * self.config.threshold_decrease_multiplier)
                    .max(self.config.threshold_floor);
                state.updates_without_addition = 0;
            }
        } else {
            state.updates_without_addition = 0;
        }
        state.additions_since_update = 0;
        log::debug!(
            "Archive threshold {:.4} ({} entries, {} added)",
            state.threshold,
            state.entries.len(),
            additions
        );
    }

    pub fn threshold(&self) -> f64 {
        self.state().threshold
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every archived behavior.
    pub fn behaviors(&self) -> Vec<Vec<f64>> {
        self.state()
            .entries
            .iter()
            .map(|e| e.behavior.clone())
            .collect()
    }

    /// Copy of every archived entry.
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        self.state().entries.clone()
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config() -> ArchiveConfig {
        ArchiveConfig {
            addition_threshold: 1.0,
            threshold_floor: 0.5,
            threshold_increase_multiplier: 2.0,
            threshold_decrease_multiplier: 0.5,
            max_generational_additions: 1,
            max_generations_without_addition: 2,
        }
    }

    #[test]
    fn test_first_behavior_always_added() {
        let archive = NoveltyArchive::new(config());
        assert!(archive.test_and_add(1, &[0.0, 0.0], 0));
        assert_eq!(archive.len(), 1);
        assert!(!archive.test_and_add(2, &[], 0));
    }

    #[test]
    fn test_threshold_gates_additions() {
        let archive = NoveltyArchive::new(config());
        assert!(archive.test_and_add(1, &[0.0, 0.0], 0));
        assert!(!archive.test_and_add(2, &[0.5, 0.5], 0));
        assert!(archive.test_and_add(3, &[2.0, 0.0], 0));
        assert_eq!(archive.entries()[1].genome_id, 3);
    }

    #[test]
    fn test_threshold_rises_after_many_additions() {
        let archive = NoveltyArchive::new(config());
        archive.test_and_add(1, &[0.0], 0);
        archive.test_and_add(2, &[5.0], 0);
        archive.update_parameters();
        assert_eq!(archive.threshold(), 2.0);
    }

    #[test]
    fn test_threshold_decays_to_floor() {
        let archive = NoveltyArchive::new(config());
        for _ in 0..2 {
            archive.update_parameters();
        }
        assert_eq!(archive.threshold(), 0.5);
        for _ in 0..4 {
            archive.update_parameters();
        }
        assert_eq!(archive.threshold(), 0.5);
    }

    #[test]
    fn test_concurrent_additions() {
        use std::sync::Arc;

        let archive = Arc::new(NoveltyArchive::new(config()));
        let handles: Vec<_> = (0..4u64)
            .map(|t| {
                let archive = Arc::clone(&archive);
                std::thread::spawn(move || {
                    for i in 0..10u64 {
                        let x = (t * 10 + i) as f64 * 3.0;
                        archive.test_and_add(t * 10 + i, &[x], 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(archive.len(), 40);
    }

    proptest! {
        #[test]
        fn prop_threshold_never_below_floor(
            additions in proptest::collection::vec(0usize..4, 1..40),
        ) {
            let archive = NoveltyArchive::new(config());
            let mut next = 0.0;
            for count in additions {
                for _ in 0..count {
                    next += 1000.0;
                    archive.test_and_add(next as u64, &[next], 0);
                }
                archive.update_parameters();
                prop_assert!(archive.threshold() >= 0.5);
            }
        }
    }
}
