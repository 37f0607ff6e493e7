//! Behavior characterization and minimal-criteria checks.
//!
//! A characterization accumulates the samples a trial produces (positions, for
//! the navigation domain) and reduces them to a behavior vector. Minimal criteria
//! are pure predicates over the resulting [`BehaviorInfo`]; the first two sample
//! dimensions are treated as `(x, y)`.

use crate::schema::{BehaviorCharacterizationKind, BehaviorConfig, MinimalCriteriaConfig};

/// Reduced behavior of one trial.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BehaviorInfo {
    /// Behavior vector (final sample, or every sample concatenated).
    pub behaviors: Vec<f64>,
    /// Final sample.
    pub end_point: Vec<f64>,
    /// Path length over all samples.
    pub mileage: f64,
}

/// Pass/fail predicate over a behavior.
#[derive(Debug, Clone, PartialEq)]
pub enum MinimalCriteria {
    EuclideanLocation {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    },
    EuclideanDistance {
        start: (f64, f64),
        min_distance: f64,
    },
    /// `centroid` is refreshed from the population at generation boundaries.
    PopulationCentroidDistance {
        centroid: Option<Vec<f64>>,
        min_distance: f64,
    },
    Mileage {
        min_mileage: f64,
    },
}

impl MinimalCriteria {
    pub fn from_config(config: &MinimalCriteriaConfig) -> Self {
        match *config {
            MinimalCriteriaConfig::EuclideanLocation {
                x_min,
                x_max,
                y_min,
                y_max,
            } => Self::EuclideanLocation {
                x_min,
                x_max,
                y_min,
                y_max,
            },
            MinimalCriteriaConfig::EuclideanDistance {
                x_start,
                y_start,
                min_distance,
            } => Self::EuclideanDistance {
                start: (x_start, y_start),
                min_distance,
            },
            MinimalCriteriaConfig::PopulationCentroidDistance { min_distance } => {
                Self::PopulationCentroidDistance {
                    centroid: None,
                    min_distance,
                }
            }
            MinimalCriteriaConfig::Mileage { min_mileage } => Self::Mileage { min_mileage },
        }
    }

    /// Test a behavior. An empty end point never satisfies a location criterion.
    pub fn is_satisfied(&self, info: &BehaviorInfo) -> bool {
        match self {
            Self::EuclideanLocation {
                x_min,
                x_max,
                y_min,
                y_max,
            } => match xy(&info.end_point) {
                Some((x, y)) => (*x_min..=*x_max).contains(&x) && (*y_min..=*y_max).contains(&y),
                None => false,
            },
            Self::EuclideanDistance {
                start,
                min_distance,
            } => match xy(&info.end_point) {
                Some((x, y)) => (x - start.0).hypot(y - start.1) >= *min_distance,
                None => false,
            },
            Self::PopulationCentroidDistance {
                centroid,
                min_distance,
            } => {
                if info.end_point.is_empty() {
                    return false;
                }
                // Nothing to compare against before the first refresh
                match centroid {
                    Some(centroid) => euclidean(&info.end_point, centroid) >= *min_distance,
                    None => true,
                }
            }
            Self::Mileage { min_mileage } => info.mileage >= *min_mileage,
        }
    }

    /// Rebuild the centroid from the end points of a population.
    ///
    /// Only affects [`MinimalCriteria::PopulationCentroidDistance`]; empty end
    /// points are ignored.
    pub fn refresh_population_centroid(&mut self, end_points: &[Vec<f64>]) {
        if let Self::PopulationCentroidDistance { centroid, .. } = self {
            let points: Vec<&Vec<f64>> = end_points.iter().filter(|p| !p.is_empty()).collect();
            let Some(dims) = points.iter().map(|p| p.len()).max() else {
                *centroid = None;
                return;
            };
            let mut sum = vec![0.0; dims];
            for point in &points {
                for (s, v) in sum.iter_mut().zip(point.iter()) {
                    *s += v;
                }
            }
            let n = points.len() as f64;
            *centroid = Some(sum.into_iter().map(|s| s / n).collect());
        }
    }
}

/// Accumulates trial samples into a behavior.
#[derive(Debug, Clone)]
pub struct BehaviorCharacterization {
    kind: BehaviorCharacterizationKind,
    minimal_criteria: Option<MinimalCriteria>,
    behaviors: Vec<f64>,
    last: Option<Vec<f64>>,
    mileage: f64,
}

impl BehaviorCharacterization {
    pub fn new(kind: BehaviorCharacterizationKind, minimal_criteria: Option<MinimalCriteria>) -> Self {
        Self {
            kind,
            minimal_criteria,
            behaviors: Vec::new(),
            last: None,
            mileage: 0.0,
        }
    }

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self::new(
            config.characterization,
            config.minimal_criteria.as_ref().map(MinimalCriteria::from_config),
        )
    }

    pub fn kind(&self) -> BehaviorCharacterizationKind {
        self.kind
    }

    pub fn minimal_criteria(&self) -> Option<&MinimalCriteria> {
        self.minimal_criteria.as_ref()
    }

    pub fn minimal_criteria_mut(&mut self) -> Option<&mut MinimalCriteria> {
        self.minimal_criteria.as_mut()
    }

    /// Record one sample.
    pub fn update_behaviors(&mut self, sample: &[f64]) {
        if let Some(last) = &self.last {
            self.mileage += euclidean(last, sample);
        }
        match self.kind {
            BehaviorCharacterizationKind::EndPoint => {
                self.behaviors.clear();
                self.behaviors.extend_from_slice(sample);
            }
            BehaviorCharacterizationKind::Trajectory => self.behaviors.extend_from_slice(sample),
        }
        self.last = Some(sample.to_vec());
    }

    pub fn behavior_vector(&self) -> &[f64] {
        &self.behaviors
    }

    pub fn behavior_info(&self) -> BehaviorInfo {
        BehaviorInfo {
            behaviors: self.behaviors.clone(),
            end_point: self.last.clone().unwrap_or_default(),
            mileage: self.mileage,
        }
    }

    /// True when no criteria are configured.
    pub fn is_minimal_criteria_satisfied(&self) -> bool {
        self.minimal_criteria
            .as_ref()
            .is_none_or(|criteria| criteria.is_satisfied(&self.behavior_info()))
    }

    /// Clear samples, keeping kind and criteria.
    pub fn reset(&mut self) {
        self.behaviors.clear();
        self.last = None;
        self.mileage = 0.0;
    }
}

fn xy(point: &[f64]) -> Option<(f64, f64)> {
    match point {
        [x, y, ..] => Some((*x, *y)),
        _ => None,
    }
}

/// Euclidean distance over the shared dimensions of two points.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}
