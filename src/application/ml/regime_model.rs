//! Gaussian regime model: standardization, optional principal-component
//! projection and a Gaussian HMM, fitted together on one window.
//!
//! Every `fit` starts from scratch. The previous fitted state is discarded
//! before any validation, so a failed fit leaves the model unfitted.

use super::hmm::{FitReport, GaussianHmm, HmmOptions};
use super::predictor::RegimeEstimator;
use super::projection::PrincipalProjection;
use super::scaler::StandardScaler;
use crate::domain::config::ModelConfig;
use crate::domain::errors::{InputError, ModelError, SnapshotError};
use crate::domain::ml::model_snapshot::{ModelSnapshot, SNAPSHOT_SCHEMA_VERSION};
use ndarray::Array2;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct FittedState {
    scaler: StandardScaler,
    projection: Option<PrincipalProjection>,
    hmm: GaussianHmm,
}

#[derive(Debug, Clone)]
pub struct GaussianRegimeModel {
    config: ModelConfig,
    feature_names: Vec<String>,
    warn_on_convergence: bool,
    fitted: Option<FittedState>,
}

impl GaussianRegimeModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            feature_names: Vec::new(),
            warn_on_convergence: true,
            fitted: None,
        }
    }

    /// Record the training column names so they travel with snapshots.
    pub fn with_feature_names(mut self, names: Vec<String>) -> Self {
        self.feature_names = names;
        self
    }

    /// Log non-convergence at `debug` instead of `warn`. Used by callers that
    /// aggregate convergence warnings themselves.
    pub fn quiet_convergence(mut self) -> Self {
        self.warn_on_convergence = false;
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Dimension the HMM emits in, after any projection.
    pub fn n_emission_features(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.hmm.n_features())
    }

    pub fn fit(&mut self, x: &Array2<f64>) -> Result<FitReport, ModelError> {
        self.fitted = None;
        self.config.validate()?;
        if x.nrows() < 2 {
            return Err(InputError::TooFewRows {
                required: 2,
                actual: x.nrows(),
            }
            .into());
        }
        if x.ncols() == 0 {
            return Err(InputError::NoColumns.into());
        }
        if !self.feature_names.is_empty() && self.feature_names.len() != x.ncols() {
            return Err(InputError::FeatureCountMismatch {
                expected: self.feature_names.len(),
                actual: x.ncols(),
            }
            .into());
        }
        ensure_finite(x)?;

        let scaler = StandardScaler::fit(x);
        let standardized = scaler.transform(x);
        let projection = self
            .config
            .n_pca_components
            .map(|k| PrincipalProjection::fit(&standardized, k))
            .transpose()?;
        let emitted = match &projection {
            Some(p) => p.transform(&standardized),
            None => standardized,
        };

        let (hmm, report) = GaussianHmm::fit(&emitted, &HmmOptions::from(&self.config))?;
        if !report.converged {
            if self.warn_on_convergence {
                warn!(
                    "HMM did not converge within {} iterations (log-likelihood {:.4})",
                    self.config.n_iter, report.log_likelihood
                );
            } else {
                debug!(
                    "HMM did not converge within {} iterations",
                    self.config.n_iter
                );
            }
        }

        self.fitted = Some(FittedState {
            scaler,
            projection,
            hmm,
        });
        Ok(report)
    }

    /// Viterbi path over raw states.
    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, ModelError> {
        let (fitted, emitted) = self.preprocess(x)?;
        Ok(fitted.hmm.decode(&emitted))
    }

    /// Forward-backward posteriors, one row per input row.
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let (fitted, emitted) = self.preprocess(x)?;
        Ok(fitted.hmm.posteriors(&emitted).0)
    }

    /// Log-likelihood of `x` under the fitted model.
    pub fn score(&self, x: &Array2<f64>) -> Result<f64, ModelError> {
        let (fitted, emitted) = self.preprocess(x)?;
        Ok(fitted.hmm.log_likelihood(&emitted))
    }

    /// Transition matrix over raw states.
    pub fn transmat(&self) -> Result<&Array2<f64>, ModelError> {
        self.fitted
            .as_ref()
            .map(|f| f.hmm.transmat())
            .ok_or(ModelError::NotFitted)
    }

    fn preprocess(&self, x: &Array2<f64>) -> Result<(&FittedState, Array2<f64>), ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        if x.ncols() != fitted.scaler.n_features() {
            return Err(InputError::FeatureCountMismatch {
                expected: fitted.scaler.n_features(),
                actual: x.ncols(),
            }
            .into());
        }
        ensure_finite(x)?;
        let standardized = fitted.scaler.transform(x);
        let emitted = match &fitted.projection {
            Some(p) => p.transform(&standardized),
            None => standardized,
        };
        Ok((fitted, emitted))
    }

    pub fn snapshot(&self) -> Result<ModelSnapshot, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        Ok(ModelSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config: self.config.clone(),
            feature_names: self.feature_names.clone(),
            scaler: fitted.scaler.to_params(),
            projection: fitted.projection.as_ref().map(|p| p.to_params()),
            hmm: fitted.hmm.to_params(),
        })
    }

    pub fn from_snapshot(snapshot: &ModelSnapshot) -> Result<Self, SnapshotError> {
        snapshot.validate()?;
        let hmm = GaussianHmm::from_params(&snapshot.hmm).map_err(ModelError::from)?;
        Ok(Self {
            config: snapshot.config.clone(),
            feature_names: snapshot.feature_names.clone(),
            warn_on_convergence: true,
            fitted: Some(FittedState {
                scaler: StandardScaler::from_params(&snapshot.scaler),
                projection: snapshot
                    .projection
                    .as_ref()
                    .map(PrincipalProjection::from_params),
                hmm,
            }),
        })
    }
}

impl RegimeEstimator for GaussianRegimeModel {
    fn fit(&mut self, x: &Array2<f64>) -> Result<FitReport, ModelError> {
        GaussianRegimeModel::fit(self, x)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, ModelError> {
        GaussianRegimeModel::predict(self, x)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        GaussianRegimeModel::predict_proba(self, x)
    }

    fn n_states(&self) -> usize {
        self.config.n_components
    }
}

fn ensure_finite(x: &Array2<f64>) -> Result<(), InputError> {
    match x.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, column), _)) => Err(InputError::NonFinite { row, column }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::CovarianceType;
    use crate::domain::errors::FitError;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn normal(rng: &mut StdRng) -> f64 {
        let u1: f64 = rng.random::<f64>().max(1e-12);
        let u2: f64 = rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Calm/volatile alternation in three features.
    fn regime_data(n: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(11);
        Array2::from_shape_fn((n, 3), |(t, j)| {
            let vol = if (t / 40) % 2 == 0 { 0.5 } else { 3.0 };
            match j {
                0 => vol * normal(&mut rng),
                1 => vol + 0.1 * normal(&mut rng),
                _ => 1.0 + 0.2 * normal(&mut rng),
            }
        })
    }

    fn config() -> ModelConfig {
        ModelConfig {
            n_components: 2,
            n_pca_components: None,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = GaussianRegimeModel::new(config());
        let x = regime_data(10);
        assert_eq!(model.predict(&x).unwrap_err(), ModelError::NotFitted);
        assert_eq!(model.predict_proba(&x).unwrap_err(), ModelError::NotFitted);
        assert_eq!(model.score(&x).unwrap_err(), ModelError::NotFitted);
        assert!(model.snapshot().is_err());
    }

    #[test]
    fn test_fit_and_predict_shapes() {
        let x = regime_data(160);
        let mut model = GaussianRegimeModel::new(config());
        let report = model.fit(&x).unwrap();
        assert!(report.iterations >= 1);

        let proba = model.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (160, 2));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-6);
            assert!(row.iter().all(|p| *p >= 0.0));
        }
        assert_eq!(model.predict(&x).unwrap().len(), 160);
        assert!(model.score(&x).unwrap().is_finite());
    }

    #[test]
    fn test_rejects_non_finite_input() {
        let mut x = regime_data(50);
        x[[7, 2]] = f64::NAN;
        let mut model = GaussianRegimeModel::new(config());
        assert_eq!(
            model.fit(&x).unwrap_err(),
            ModelError::Input(InputError::NonFinite { row: 7, column: 2 })
        );
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_rejects_single_row() {
        let x = regime_data(1);
        let mut model = GaussianRegimeModel::new(config());
        assert!(matches!(
            model.fit(&x),
            Err(ModelError::Input(InputError::TooFewRows { required: 2, actual: 1 }))
        ));
    }

    #[test]
    fn test_fewer_rows_than_states_is_fit_error() {
        let x = regime_data(3);
        let mut model = GaussianRegimeModel::new(ModelConfig {
            n_components: 5,
            ..config()
        });
        assert!(matches!(
            model.fit(&x),
            Err(ModelError::Fit(FitError::InsufficientSamples { .. }))
        ));
    }

    #[test]
    fn test_failed_refit_clears_previous_fit() {
        let mut model = GaussianRegimeModel::new(config());
        model.fit(&regime_data(100)).unwrap();
        assert!(model.is_fitted());
        assert!(model.fit(&regime_data(1)).is_err());
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_projection_reduces_emission_dimension() {
        let x = regime_data(120);
        let mut model = GaussianRegimeModel::new(ModelConfig {
            n_pca_components: Some(2),
            ..config()
        });
        model.fit(&x).unwrap();
        assert_eq!(model.n_emission_features(), Some(2));

        // Projection size larger than the feature count is clamped
        let mut model = GaussianRegimeModel::new(ModelConfig {
            n_pca_components: Some(10),
            ..config()
        });
        model.fit(&x).unwrap();
        assert_eq!(model.n_emission_features(), Some(3));
    }

    #[test]
    fn test_feature_count_checked_on_predict() {
        let mut model = GaussianRegimeModel::new(config());
        model.fit(&regime_data(80)).unwrap();
        let narrow = Array2::zeros((5, 2));
        assert!(matches!(
            model.predict(&narrow),
            Err(ModelError::Input(InputError::FeatureCountMismatch { expected: 3, actual: 2 }))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip_reproduces_predictions() {
        let x = regime_data(160);
        for cov_type in [CovarianceType::Full, CovarianceType::Tied] {
            let mut model = GaussianRegimeModel::new(ModelConfig {
                covariance_type: cov_type,
                n_pca_components: Some(2),
                ..config()
            })
            .with_feature_names(vec!["ret".into(), "vol".into(), "volume".into()]);
            model.fit(&x).unwrap();

            let snapshot = model.snapshot().unwrap();
            assert_eq!(snapshot.feature_names.len(), 3);
            let json = serde_json::to_string(&snapshot).unwrap();
            let decoded: ModelSnapshot = serde_json::from_str(&json).unwrap();
            let restored = GaussianRegimeModel::from_snapshot(&decoded).unwrap();

            assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
            assert_eq!(
                restored.predict_proba(&x).unwrap(),
                model.predict_proba(&x).unwrap()
            );
        }
    }
}
