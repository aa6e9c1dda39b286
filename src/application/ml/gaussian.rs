//! Multivariate Gaussian emission density for one hidden state.

use crate::domain::errors::FitError;
use nalgebra::{Cholesky, DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1};
use std::f64::consts::PI;

/// Gaussian with a cached Cholesky factor of its covariance.
#[derive(Debug, Clone)]
pub struct GaussianEmission {
    mean: Array1<f64>,
    covariance: Array2<f64>,
    /// Lower-triangular factor, `covariance = L * L^T`
    chol_l: DMatrix<f64>,
    /// `d * ln(2*pi) + ln|covariance|`
    log_norm: f64,
}

impl GaussianEmission {
    /// Factor `covariance`. Fails when it is not positive definite.
    pub fn new(state: usize, mean: Array1<f64>, covariance: Array2<f64>) -> Result<Self, FitError> {
        let d = mean.len();
        if covariance.dim() != (d, d) || covariance.iter().any(|v| !v.is_finite()) {
            return Err(FitError::SingularCovariance { state });
        }

        let matrix = DMatrix::from_fn(d, d, |i, j| covariance[[i, j]]);
        let chol = Cholesky::new(matrix).ok_or(FitError::SingularCovariance { state })?;
        let chol_l = chol.l();

        let log_det: f64 = 2.0 * (0..d).map(|i| chol_l[(i, i)].ln()).sum::<f64>();
        if !log_det.is_finite() {
            return Err(FitError::SingularCovariance { state });
        }

        Ok(Self {
            mean,
            covariance,
            chol_l,
            log_norm: d as f64 * (2.0 * PI).ln() + log_det,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Log density at `x`.
    pub fn log_pdf(&self, x: ArrayView1<f64>) -> f64 {
        let diff = DVector::from_iterator(
            self.dim(),
            x.iter().zip(self.mean.iter()).map(|(a, m)| a - m),
        );
        match self.chol_l.solve_lower_triangular(&diff) {
            Some(z) => -0.5 * (self.log_norm + z.norm_squared()),
            None => f64::NEG_INFINITY,
        }
    }

    /// Log density of every row of `x`.
    pub fn log_pdf_rows(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.log_pdf(row)).collect()
    }
}
