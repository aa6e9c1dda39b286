use crate::domain::ml::model_snapshot::ScalerParams;
use ndarray::{Array1, Array2, Axis};
use statrs::statistics::Statistics;

/// Columns with a standard deviation below this keep unit scale.
const ZERO_SCALE: f64 = 10.0 * f64::EPSILON;

/// Z-score standardization with statistics taken from one fit call.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Column means and population standard deviations of `x`.
    pub fn fit(x: &Array2<f64>) -> Self {
        let mut mean = Array1::zeros(x.ncols());
        let mut scale = Array1::ones(x.ncols());
        for (j, column) in x.axis_iter(Axis(1)).enumerate() {
            mean[j] = column.iter().mean();
            let std = column.iter().population_std_dev();
            if std.is_finite() && std > ZERO_SCALE {
                scale[j] = std;
            }
        }
        Self { mean, scale }
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    pub fn to_params(&self) -> ScalerParams {
        ScalerParams {
            mean: self.mean.to_vec(),
            scale: self.scale.to_vec(),
        }
    }

    pub fn from_params(params: &ScalerParams) -> Self {
        Self {
            mean: Array1::from(params.mean.clone()),
            scale: Array1::from(params.scale.clone()),
        }
    }
}
