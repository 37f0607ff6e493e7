//! Behavior characterization and minimal-criteria configuration.

use serde::{Deserialize, Serialize};

use super::config::{ConfigError, check_non_negative};

/// How trial samples are reduced to a behavior vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BehaviorCharacterizationKind {
    /// Keep only the final sample.
    #[default]
    EndPoint,
    /// Keep every sample, concatenated in order.
    Trajectory,
}

/// Pass/fail predicate over a trial's behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MinimalCriteriaConfig {
    /// End point must lie inside an inclusive bounding box.
    EuclideanLocation {
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
    },
    /// End point must be at least `min_distance` from a fixed start.
    EuclideanDistance {
        x_start: f64,
        y_start: f64,
        min_distance: f64,
    },
    /// End point must be at least `min_distance` from the population's behavioral centroid.
    PopulationCentroidDistance { min_distance: f64 },
    /// Total path length must be at least `min_mileage`.
    Mileage { min_mileage: f64 },
}

/// Behavior settings for one evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default)]
    pub characterization: BehaviorCharacterizationKind,
    #[serde(default)]
    pub minimal_criteria: Option<MinimalCriteriaConfig>,
}

impl MinimalCriteriaConfig {
    /// Validate bounds and thresholds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::EuclideanLocation {
                x_min,
                x_max,
                y_min,
                y_max,
            } => {
                if x_min > x_max || y_min > y_max {
                    return Err(ConfigError::InvalidBounds(format!(
                        "location box x [{x_min}, {x_max}] y [{y_min}, {y_max}] is inverted"
                    )));
                }
                Ok(())
            }
            Self::EuclideanDistance { min_distance, .. }
            | Self::PopulationCentroidDistance { min_distance } => {
                check_non_negative(min_distance, "min_distance")
            }
            Self::Mileage { min_mileage } => check_non_negative(min_mileage, "min_mileage"),
        }
    }
}

impl BehaviorConfig {
    /// Validate the optional minimal criteria.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.minimal_criteria {
            Some(criteria) => criteria.validate(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_box_rejected() {
        let criteria = MinimalCriteriaConfig::EuclideanLocation {
            x_min: 5.0,
            x_max: 1.0,
            y_min: 0.0,
            y_max: 1.0,
        };
        assert!(matches!(
            criteria.validate(),
            Err(ConfigError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_negative_mileage_rejected() {
        let criteria = MinimalCriteriaConfig::Mileage { min_mileage: -1.0 };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn test_tagged_serialization() {
        let json = r#"{"characterization":"Trajectory","minimal_criteria":{"type":"Mileage","min_mileage":3.5}}"#;
        let config: BehaviorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.characterization,
            BehaviorCharacterizationKind::Trajectory
        );
        assert_eq!(
            config.minimal_criteria,
            Some(MinimalCriteriaConfig::Mileage { min_mileage: 3.5 })
        );
        assert!(config.validate().is_ok());
    }
}
