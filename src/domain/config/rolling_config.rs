//! Rolling Inference Configuration Domain Value Object
//!
//! Walk-forward parameters: window length, refit cadence, smoothing, label
//! sorting and the per-step failure policy.

use crate::domain::errors::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do with a timestep whose posterior could not be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Reuse the last committed smoothed posterior when one exists
    #[default]
    Carry,
    /// Leave the timestep unset
    Skip,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Carry => write!(f, "carry"),
            ErrorPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "carry" => Ok(ErrorPolicy::Carry),
            "skip" => Ok(ErrorPolicy::Skip),
            other => Err(InputError::InvalidParameter {
                name: "on_error",
                reason: format!("{} is not one of 'carry', 'skip'", other),
            }),
        }
    }
}

/// Rolling inference configuration
///
/// # Invariants
///
/// - `window > 1`
/// - `refit_interval >= 1`
/// - `smooth_alpha`, when set, lies in (0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
    /// Number of most recent rows in each fit/inference window
    pub window: usize,
    /// Timesteps between refits
    pub refit_interval: usize,
    /// Exponential smoothing factor for committed posteriors
    pub smooth_alpha: Option<f64>,
    /// Feature whose per-state mean orders the state labels
    pub sort_by: Option<String>,
    pub on_error: ErrorPolicy,
    /// Log progress while running
    pub verbose: bool,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            window: 512,
            refit_interval: 1,
            smooth_alpha: None,
            sort_by: None,
            on_error: ErrorPolicy::Carry,
            verbose: true,
        }
    }
}

impl RollingConfig {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.window <= 1 {
            return Err(InputError::InvalidWindow {
                window: self.window,
            });
        }
        if self.refit_interval == 0 {
            return Err(InputError::InvalidParameter {
                name: "refit_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(alpha) = self.smooth_alpha
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            return Err(InputError::InvalidParameter {
                name: "smooth_alpha",
                reason: format!("{} is outside (0, 1]", alpha),
            });
        }
        Ok(())
    }
}
