//! Principal-component projection of standardized features.
//!
//! The basis is the eigen-decomposition of the sample covariance. Each
//! component's sign is fixed so that its largest-magnitude loading is
//! positive, which keeps refits on identical data bit-for-bit identical.

use crate::domain::errors::FitError;
use crate::domain::ml::model_snapshot::ProjectionParams;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};

#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalProjection {
    mean: Array1<f64>,
    /// `n_components x n_features`
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

impl PrincipalProjection {
    /// Fit the top `n_components` directions of `x`. The count is clamped to
    /// the feature count.
    pub fn fit(x: &Array2<f64>, n_components: usize) -> Result<Self, FitError> {
        let (n, d) = x.dim();
        if n < 2 {
            return Err(FitError::Projection {
                reason: format!("need at least 2 rows, got {}", n),
            });
        }
        let k = n_components.min(d);

        let mean = x.mean_axis(Axis(0)).ok_or_else(|| FitError::Projection {
            reason: "empty input".to_string(),
        })?;
        let centered = x - &mean;
        let covariance = centered.t().dot(&centered) / (n as f64 - 1.0);

        let eigen = SymmetricEigen::new(DMatrix::from_fn(d, d, |i, j| covariance[[i, j]]));

        let mut ranked: Vec<usize> = (0..d).collect();
        ranked.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let mut components = Array2::zeros((k, d));
        let mut explained_variance = Array1::zeros(k);
        for (c, &idx) in ranked.iter().take(k).enumerate() {
            let vector = eigen.eigenvectors.column(idx);
            let pivot = (0..d)
                .max_by(|&a, &b| vector[a].abs().total_cmp(&vector[b].abs()))
                .unwrap_or(0);
            let sign = if vector[pivot] < 0.0 { -1.0 } else { 1.0 };
            for j in 0..d {
                components[[c, j]] = sign * vector[j];
            }
            explained_variance[c] = eigen.eigenvalues[idx].max(0.0);
        }

        if components.iter().any(|v| !v.is_finite()) {
            return Err(FitError::Projection {
                reason: "eigenvectors are not finite".to_string(),
            });
        }

        Ok(Self {
            mean,
            components,
            explained_variance,
        })
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).dot(&self.components.t())
    }

    pub fn to_params(&self) -> ProjectionParams {
        ProjectionParams {
            mean: self.mean.to_vec(),
            components: self.components.outer_iter().map(|row| row.to_vec()).collect(),
            explained_variance: self.explained_variance.to_vec(),
        }
    }

    pub fn from_params(params: &ProjectionParams) -> Self {
        let k = params.components.len();
        let d = params.mean.len();
        let components = Array2::from_shape_fn((k, d), |(i, j)| params.components[i][j]);
        Self {
            mean: Array1::from(params.mean.clone()),
            components,
            explained_variance: Array1::from(params.explained_variance.clone()),
        }
    }
}
