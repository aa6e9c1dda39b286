//! `REGIME_*` environment overrides.
//!
//! Lookups go through a caller-supplied function so tests never mutate the
//! process environment.

use super::RegimeConfig;
use anyhow::{Context, Result};
use std::str::FromStr;

/// Every variable `apply_overrides` reads.
pub const ENV_KEYS: &[&str] = &[
    "REGIME_N_COMPONENTS",
    "REGIME_COVARIANCE_TYPE",
    "REGIME_N_ITER",
    "REGIME_N_PCA_COMPONENTS",
    "REGIME_RANDOM_STATE",
    "REGIME_WINDOW",
    "REGIME_REFIT_INTERVAL",
    "REGIME_SMOOTH_ALPHA",
    "REGIME_SORT_BY",
    "REGIME_ON_ERROR",
    "REGIME_VERBOSE",
];

/// Override fields of `config` with every variable `lookup` resolves.
///
/// `REGIME_SMOOTH_ALPHA`, `REGIME_SORT_BY` and `REGIME_N_PCA_COMPONENTS`
/// accept `none` (or an empty value) to clear the setting.
pub fn apply_overrides<F>(mut config: RegimeConfig, lookup: F) -> Result<RegimeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse::<usize, _>(&lookup, "REGIME_N_COMPONENTS")? {
        config.model.n_components = v;
    }
    if let Some(v) = parse(&lookup, "REGIME_COVARIANCE_TYPE")? {
        config.model.covariance_type = v;
    }
    if let Some(v) = parse::<usize, _>(&lookup, "REGIME_N_ITER")? {
        config.model.n_iter = v;
    }
    if let Some(v) = parse_optional::<usize, _>(&lookup, "REGIME_N_PCA_COMPONENTS")? {
        config.model.n_pca_components = v.filter(|&k| k > 0);
    }
    if let Some(v) = parse::<u64, _>(&lookup, "REGIME_RANDOM_STATE")? {
        config.model.random_state = v;
    }
    if let Some(v) = parse::<usize, _>(&lookup, "REGIME_WINDOW")? {
        config.rolling.window = v;
    }
    if let Some(v) = parse::<usize, _>(&lookup, "REGIME_REFIT_INTERVAL")? {
        config.rolling.refit_interval = v;
    }
    if let Some(v) = parse_optional::<f64, _>(&lookup, "REGIME_SMOOTH_ALPHA")? {
        config.rolling.smooth_alpha = v;
    }
    if let Some(v) = parse_optional::<String, _>(&lookup, "REGIME_SORT_BY")? {
        config.rolling.sort_by = v;
    }
    if let Some(v) = parse(&lookup, "REGIME_ON_ERROR")? {
        config.rolling.on_error = v;
    }
    if let Some(v) = parse::<bool, _>(&lookup, "REGIME_VERBOSE")? {
        config.rolling.verbose = v;
    }
    Ok(config)
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>())
        .transpose()
        .context(format!("Failed to parse {}", key))
}

/// Outer `None`: variable unset. Inner `None`: explicitly cleared.
fn parse_optional<T, F>(lookup: &F, key: &str) -> Result<Option<Option<T>>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(Some(None));
    }
    let value = raw
        .parse::<T>()
        .context(format!("Failed to parse {}", key))?;
    Ok(Some(Some(value)))
}
