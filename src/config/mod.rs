//! Configuration module for the regime engine.
//!
//! Settings come from an optional TOML file (every field defaulted), then
//! `REGIME_*` environment variables override individual fields. The result
//! is validated before any run starts.

mod env_overrides;

pub use env_overrides::{ENV_KEYS, apply_overrides};

pub use crate::domain::config::{CovarianceType, ErrorPolicy, ModelConfig, RollingConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Full engine configuration.
///
/// ```toml
/// [model]
/// n_components = 3
/// covariance_type = "full"
///
/// [rolling]
/// window = 512
/// sort_by = "rolling_std_medium"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub model: ModelConfig,
    pub rolling: RollingConfig,
}

impl RegimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse regime config")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env()
    }

    /// File (or defaults), then environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = base.with_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env(self) -> Result<Self> {
        apply_overrides(self, |key| env::var(key).ok())
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate().context("Invalid [model] settings")?;
        self.rolling.validate().context("Invalid [rolling] settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegimeConfig::default();
        assert_eq!(config.model.n_components, 3);
        assert_eq!(config.model.covariance_type, CovarianceType::Full);
        assert_eq!(config.model.n_iter, 100);
        assert_eq!(config.model.n_pca_components, Some(10));
        assert_eq!(config.model.random_state, 42);
        assert_eq!(config.rolling.window, 512);
        assert_eq!(config.rolling.refit_interval, 1);
        assert_eq!(config.rolling.on_error, ErrorPolicy::Carry);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RegimeConfig::from_toml_str(
            r#"
            [model]
            n_components = 2
            covariance_type = "diag"

            [rolling]
            window = 64
            smooth_alpha = 0.2
            sort_by = "vol"
            on_error = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.n_components, 2);
        assert_eq!(config.model.covariance_type, CovarianceType::Diag);
        assert_eq!(config.model.tol, 1e-2);
        assert_eq!(config.rolling.window, 64);
        assert_eq!(config.rolling.smooth_alpha, Some(0.2));
        assert_eq!(config.rolling.sort_by.as_deref(), Some("vol"));
        assert_eq!(config.rolling.on_error, ErrorPolicy::Skip);
        assert_eq!(config.rolling.refit_interval, 1);
    }

    #[test]
    fn test_unknown_covariance_type_rejected() {
        let result = RegimeConfig::from_toml_str("[model]\ncovariance_type = \"banded\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_reports_section() {
        let mut config = RegimeConfig::default();
        config.rolling.window = 1;
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("[rolling]"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = RegimeConfig::default();
        config.rolling.sort_by = Some("rolling_std_medium".to_string());
        config.model.n_pca_components = None;
        let text = toml::to_string(&config).unwrap();
        assert_eq!(RegimeConfig::from_toml_str(&text).unwrap(), config);
    }
}
