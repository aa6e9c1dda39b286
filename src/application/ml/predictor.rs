use super::hmm::FitReport;
use crate::domain::errors::ModelError;
use ndarray::Array2;

/// Interface for regime models driven by the rolling inference loop
pub trait RegimeEstimator {
    /// Fit from scratch on a dense `T x D` window. No warm start.
    fn fit(&mut self, x: &Array2<f64>) -> Result<FitReport, ModelError>;

    /// Most likely raw state per row
    fn predict(&self, x: &Array2<f64>) -> Result<Vec<usize>, ModelError>;

    /// Per-row posterior over raw states, rows summing to 1
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError>;

    /// Number of hidden states
    fn n_states(&self) -> usize;
}
