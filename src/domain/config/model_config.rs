//! Model Configuration Domain Value Object
//!
//! Hyper-parameters of the Gaussian regime model: state count, covariance
//! structure, EM budget and the optional projection size.

use crate::domain::errors::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Structure imposed on each state's emission covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceType {
    /// Unrestricted covariance per state
    #[default]
    Full,
    /// Per-state diagonal covariance
    Diag,
    /// Per-state single variance shared by all dimensions
    Spherical,
    /// One full covariance shared by all states
    Tied,
}

impl fmt::Display for CovarianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CovarianceType::Full => write!(f, "full"),
            CovarianceType::Diag => write!(f, "diag"),
            CovarianceType::Spherical => write!(f, "spherical"),
            CovarianceType::Tied => write!(f, "tied"),
        }
    }
}

impl FromStr for CovarianceType {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(CovarianceType::Full),
            "diag" => Ok(CovarianceType::Diag),
            "spherical" => Ok(CovarianceType::Spherical),
            "tied" => Ok(CovarianceType::Tied),
            other => Err(InputError::InvalidParameter {
                name: "covariance_type",
                reason: format!(
                    "{} is not one of 'full', 'diag', 'spherical', 'tied'",
                    other
                ),
            }),
        }
    }
}

/// Gaussian regime model configuration
///
/// # Invariants
///
/// - `n_components >= 1`, `n_iter >= 1`
/// - `tol` is finite and non-negative, `min_covar` is finite and positive
/// - `n_pca_components`, when set, is at least 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Number of hidden regimes
    pub n_components: usize,
    pub covariance_type: CovarianceType,
    /// EM iteration cap
    pub n_iter: usize,
    /// Minimum log-likelihood gain to keep iterating
    pub tol: f64,
    /// Floor added to every covariance diagonal
    pub min_covar: f64,
    /// Principal components to keep after standardization (None = no projection).
    /// Written as `0` in config files when disabled.
    #[serde(with = "optional_count")]
    pub n_pca_components: Option<usize>,
    /// Seed for centroid initialization
    pub random_state: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_components: 3,
            covariance_type: CovarianceType::Full,
            n_iter: 100,
            tol: 1e-2,
            min_covar: 1e-3,
            n_pca_components: Some(10),
            random_state: 42,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.n_components == 0 {
            return Err(InputError::InvalidParameter {
                name: "n_components",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.n_iter == 0 {
            return Err(InputError::InvalidParameter {
                name: "n_iter",
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(InputError::InvalidParameter {
                name: "tol",
                reason: format!("{} must be finite and >= 0", self.tol),
            });
        }
        if !self.min_covar.is_finite() || self.min_covar <= 0.0 {
            return Err(InputError::InvalidParameter {
                name: "min_covar",
                reason: format!("{} must be finite and > 0", self.min_covar),
            });
        }
        if self.n_pca_components == Some(0) {
            return Err(InputError::InvalidParameter {
                name: "n_pca_components",
                reason: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

/// `Option<usize>` stored as a plain count, with `0` meaning `None`.
mod optional_count {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<usize>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.unwrap_or(0) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
        let count = usize::deserialize(deserializer)?;
        Ok(if count == 0 { None } else { Some(count) })
    }
}
