//! Serializable record of a fitted regime model.
//!
//! The record uses plain vectors rather than the in-memory matrix types so
//! that the on-disk schema does not move when the internals do.

use crate::domain::config::{CovarianceType, ModelConfig};
use crate::domain::errors::SnapshotError;
use serde::{Deserialize, Serialize};

/// Current on-disk schema version.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Per-column standardization statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Linear projection fitted on standardized data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub mean: Vec<f64>,
    /// One row per retained component, `n_features` columns each
    pub components: Vec<Vec<f64>>,
    pub explained_variance: Vec<f64>,
}

/// Gaussian HMM parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmParams {
    pub covariance_type: CovarianceType,
    pub start_prob: Vec<f64>,
    pub transmat: Vec<Vec<f64>>,
    pub means: Vec<Vec<f64>>,
    /// Full covariance matrix per state, whatever the covariance type
    pub covariances: Vec<Vec<Vec<f64>>>,
}

impl HmmParams {
    pub fn n_states(&self) -> usize {
        self.start_prob.len()
    }

    pub fn n_features(&self) -> usize {
        self.means.first().map(|m| m.len()).unwrap_or(0)
    }
}

/// Everything needed to reproduce a fitted model's predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub schema_version: u32,
    pub config: ModelConfig,
    /// Training columns, in the order the model expects them
    pub feature_names: Vec<String>,
    pub scaler: ScalerParams,
    pub projection: Option<ProjectionParams>,
    pub hmm: HmmParams,
}

impl ModelSnapshot {
    /// Structural checks applied before a snapshot is turned back into a model.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::SchemaVersion {
                found: self.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }

        let n_features = self.scaler.mean.len();
        if self.scaler.scale.len() != n_features {
            return Err(inconsistent("scaler mean and scale lengths differ"));
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != n_features {
            return Err(inconsistent("feature names do not match scaler width"));
        }

        let emission_dim = match &self.projection {
            Some(p) => {
                if p.mean.len() != n_features
                    || p.components.iter().any(|c| c.len() != n_features)
                {
                    return Err(inconsistent("projection width does not match scaler"));
                }
                p.components.len()
            }
            None => n_features,
        };

        let n_states = self.hmm.n_states();
        if n_states == 0 {
            return Err(inconsistent("HMM has no states"));
        }
        if self.hmm.transmat.len() != n_states
            || self.hmm.transmat.iter().any(|row| row.len() != n_states)
        {
            return Err(inconsistent("transition matrix is not n_states x n_states"));
        }
        if self.hmm.means.len() != n_states || self.hmm.covariances.len() != n_states {
            return Err(inconsistent("means/covariances do not match state count"));
        }
        if self.hmm.means.iter().any(|m| m.len() != emission_dim)
            || self.hmm.covariances.iter().any(|c| {
                c.len() != emission_dim || c.iter().any(|row| row.len() != emission_dim)
            })
        {
            return Err(inconsistent("emission dimension does not match preprocessing"));
        }
        Ok(())
    }
}

fn inconsistent(reason: &str) -> SnapshotError {
    SnapshotError::Inconsistent {
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> ModelSnapshot {
        ModelSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config: ModelConfig::default(),
            feature_names: vec!["a".to_string(), "b".to_string()],
            scaler: ScalerParams {
                mean: vec![0.0, 1.0],
                scale: vec![1.0, 2.0],
            },
            projection: None,
            hmm: HmmParams {
                covariance_type: CovarianceType::Full,
                start_prob: vec![0.5, 0.5],
                transmat: vec![vec![0.9, 0.1], vec![0.2, 0.8]],
                means: vec![vec![0.0, 0.0], vec![1.0, 1.0]],
                covariances: vec![
                    vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                    vec![vec![2.0, 0.0], vec![0.0, 2.0]],
                ],
            },
        }
    }

    #[test]
    fn test_valid_snapshot() {
        assert!(sample_snapshot().validate().is_ok());
    }

    #[test]
    fn test_schema_version_checked() {
        let mut snapshot = sample_snapshot();
        snapshot.schema_version = 99;
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::SchemaVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_projection_width_checked() {
        let mut snapshot = sample_snapshot();
        snapshot.projection = Some(ProjectionParams {
            mean: vec![0.0, 0.0],
            components: vec![vec![1.0, 0.0]],
            explained_variance: vec![1.0],
        });
        // HMM is still 2-dimensional while the projection emits 1 dimension
        assert!(matches!(
            snapshot.validate(),
            Err(SnapshotError::Inconsistent { .. })
        ));
    }

    #[test]
    fn test_json_roundtrip() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"covariance_type\":\"full\""));
        let back: ModelSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }
}
