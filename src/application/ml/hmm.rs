//! Gaussian-emission Hidden Markov Model trained with Baum-Welch EM.
//!
//! Training is fully deterministic for a given seed: k-means++ centroids
//! (seeded `StdRng`) refined by Lloyd iterations give the initial means,
//! start and transition probabilities start uniform, and every state starts
//! from the data covariance plus the `min_covar` floor.

use super::algorithms::{
    backward, expected_transitions, forward, log_probs, posteriors, viterbi,
};
use super::gaussian::GaussianEmission;
use crate::domain::config::{CovarianceType, ModelConfig};
use crate::domain::errors::FitError;
use crate::domain::ml::model_snapshot::HmmParams;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// States whose total responsibility falls below this keep their previous
/// emission parameters.
const MIN_STATE_WEIGHT: f64 = 1e-10;
const KMEANS_MAX_ITER: usize = 100;

/// EM settings for one fit.
#[derive(Debug, Clone, PartialEq)]
pub struct HmmOptions {
    pub n_states: usize,
    pub covariance_type: CovarianceType,
    pub n_iter: usize,
    pub tol: f64,
    pub min_covar: f64,
    pub random_state: u64,
}

impl From<&ModelConfig> for HmmOptions {
    fn from(config: &ModelConfig) -> Self {
        Self {
            n_states: config.n_components,
            covariance_type: config.covariance_type,
            n_iter: config.n_iter,
            tol: config.tol,
            min_covar: config.min_covar,
            random_state: config.random_state,
        }
    }
}

/// Outcome of one EM run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitReport {
    /// EM iterations performed
    pub iterations: usize,
    /// Log-likelihood of the training data at the last E-step
    pub log_likelihood: f64,
    /// False when the iteration cap was hit before the tolerance was met
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct GaussianHmm {
    covariance_type: CovarianceType,
    start_prob: Array1<f64>,
    transmat: Array2<f64>,
    emissions: Vec<GaussianEmission>,
}

impl GaussianHmm {
    /// Run Baum-Welch on `obs` (`T x D`, all finite).
    pub fn fit(obs: &Array2<f64>, options: &HmmOptions) -> Result<(Self, FitReport), FitError> {
        let (n, d) = obs.dim();
        let k = options.n_states;
        if k == 0 || n < k.max(2) {
            return Err(FitError::InsufficientSamples {
                n_samples: n,
                n_states: k,
            });
        }

        let means = kmeans_plus_plus(obs, k, options.random_state);
        let data_cov = sample_covariance(obs) + &(Array2::<f64>::eye(d) * options.min_covar);
        let covariances = vec![shape_covariance(&data_cov, options.covariance_type); k];

        let mut model = Self::build(
            options.covariance_type,
            Array1::from_elem(k, 1.0 / k as f64),
            Array2::from_elem((k, k), 1.0 / k as f64),
            means,
            covariances,
        )?;

        let mut report = FitReport {
            iterations: 0,
            log_likelihood: f64::NEG_INFINITY,
            converged: false,
        };
        let mut previous_ll: Option<f64> = None;

        for iteration in 1..=options.n_iter {
            let log_emissions = model.log_emissions(obs);
            let log_start = log_probs(&model.start_prob);
            let log_trans = log_probs(&model.transmat);

            let (log_alpha, log_likelihood) = forward(&log_start, &log_trans, &log_emissions);
            if !log_likelihood.is_finite() {
                return Err(FitError::DegenerateLikelihood { iteration });
            }
            let log_beta = backward(&log_trans, &log_emissions);
            let gamma = posteriors(&log_alpha, &log_beta);
            let xi_sum = expected_transitions(
                &log_alpha,
                &log_beta,
                &log_trans,
                &log_emissions,
                log_likelihood,
            );

            model = model.maximize(obs, &gamma, &xi_sum, options.min_covar, iteration)?;

            report.iterations = iteration;
            report.log_likelihood = log_likelihood;

            if let Some(previous) = previous_ll
                && log_likelihood - previous < options.tol
            {
                report.converged = true;
                break;
            }
            previous_ll = Some(log_likelihood);
        }

        debug!(
            "EM finished after {} iterations (log-likelihood {:.4}, converged: {})",
            report.iterations, report.log_likelihood, report.converged
        );
        Ok((model, report))
    }

    fn build(
        covariance_type: CovarianceType,
        start_prob: Array1<f64>,
        transmat: Array2<f64>,
        means: Array2<f64>,
        covariances: Vec<Array2<f64>>,
    ) -> Result<Self, FitError> {
        let emissions = means
            .outer_iter()
            .zip(covariances)
            .enumerate()
            .map(|(state, (mean, cov))| GaussianEmission::new(state, mean.to_owned(), cov))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            covariance_type,
            start_prob,
            transmat,
            emissions,
        })
    }

    /// M-step: re-estimate every parameter from the E-step statistics.
    fn maximize(
        &self,
        obs: &Array2<f64>,
        gamma: &Array2<f64>,
        xi_sum: &Array2<f64>,
        min_covar: f64,
        iteration: usize,
    ) -> Result<Self, FitError> {
        let (n, d) = obs.dim();
        let k = self.n_states();

        let mut start_prob = gamma.row(0).to_owned();
        let start_total = start_prob.sum();
        if start_total > 0.0 {
            start_prob /= start_total;
        } else {
            start_prob = self.start_prob.clone();
        }

        let mut transmat = xi_sum.clone();
        for (i, mut row) in transmat.axis_iter_mut(Axis(0)).enumerate() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            } else {
                row.assign(&self.transmat.row(i));
            }
        }

        if start_prob.iter().chain(transmat.iter()).any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteParameters {
                what: "transition probabilities",
                iteration,
            });
        }

        let weights = gamma.sum_axis(Axis(0));
        let mut means = Array2::<f64>::zeros((k, d));
        let mut scatter: Vec<Array2<f64>> = Vec::with_capacity(k);
        for state in 0..k {
            let w = weights[state];
            if w < MIN_STATE_WEIGHT {
                means.row_mut(state).assign(self.emissions[state].mean());
                scatter.push(Array2::zeros((d, d)));
                continue;
            }
            let resp = gamma.column(state);
            let mean = obs.t().dot(&resp) / w;

            let mut s = Array2::<f64>::zeros((d, d));
            for (row, &r) in obs.outer_iter().zip(resp.iter()) {
                let diff = &row - &mean;
                for a in 0..d {
                    for b in 0..d {
                        s[[a, b]] += r * diff[a] * diff[b];
                    }
                }
            }
            means.row_mut(state).assign(&mean);
            scatter.push(s);
        }

        if means.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteParameters {
                what: "means",
                iteration,
            });
        }

        let floor = Array2::<f64>::eye(d) * min_covar;
        let covariances: Vec<Array2<f64>> = match self.covariance_type {
            CovarianceType::Tied => {
                let total = scatter.iter().fold(Array2::<f64>::zeros((d, d)), |acc, s| acc + s);
                let shared = total / n as f64 + &floor;
                vec![shared; k]
            }
            cov_type => (0..k)
                .map(|state| {
                    let w = weights[state];
                    if w < MIN_STATE_WEIGHT {
                        self.emissions[state].covariance().clone()
                    } else {
                        let full = &scatter[state] / w + &floor;
                        shape_covariance_floored(&full, cov_type, min_covar)
                    }
                })
                .collect(),
        };

        if covariances.iter().any(|c| c.iter().any(|v| !v.is_finite())) {
            return Err(FitError::NonFiniteParameters {
                what: "covariances",
                iteration,
            });
        }

        Self::build(self.covariance_type, start_prob, transmat, means, covariances)
    }

    pub fn n_states(&self) -> usize {
        self.emissions.len()
    }

    pub fn n_features(&self) -> usize {
        self.emissions.first().map(|e| e.dim()).unwrap_or(0)
    }

    pub fn covariance_type(&self) -> CovarianceType {
        self.covariance_type
    }

    pub fn start_prob(&self) -> &Array1<f64> {
        &self.start_prob
    }

    pub fn transmat(&self) -> &Array2<f64> {
        &self.transmat
    }

    pub fn means(&self) -> Array2<f64> {
        let mut means = Array2::<f64>::zeros((self.n_states(), self.n_features()));
        for (state, emission) in self.emissions.iter().enumerate() {
            means.row_mut(state).assign(emission.mean());
        }
        means
    }

    /// `T x N` matrix of emission log densities.
    fn log_emissions(&self, obs: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((obs.nrows(), self.n_states()));
        for (state, emission) in self.emissions.iter().enumerate() {
            out.column_mut(state).assign(&emission.log_pdf_rows(obs));
        }
        out
    }

    /// Forward-backward posteriors and the sequence log-likelihood.
    pub fn posteriors(&self, obs: &Array2<f64>) -> (Array2<f64>, f64) {
        let log_emissions = self.log_emissions(obs);
        let log_trans = log_probs(&self.transmat);
        let (log_alpha, log_likelihood) =
            forward(&log_probs(&self.start_prob), &log_trans, &log_emissions);
        let log_beta = backward(&log_trans, &log_emissions);
        (posteriors(&log_alpha, &log_beta), log_likelihood)
    }

    /// Viterbi state path.
    pub fn decode(&self, obs: &Array2<f64>) -> Vec<usize> {
        let log_emissions = self.log_emissions(obs);
        let (path, _) = viterbi(
            &log_probs(&self.start_prob),
            &log_probs(&self.transmat),
            &log_emissions,
        );
        path
    }

    pub fn log_likelihood(&self, obs: &Array2<f64>) -> f64 {
        let log_emissions = self.log_emissions(obs);
        let (_, log_likelihood) = forward(
            &log_probs(&self.start_prob),
            &log_probs(&self.transmat),
            &log_emissions,
        );
        log_likelihood
    }

    pub fn to_params(&self) -> HmmParams {
        HmmParams {
            covariance_type: self.covariance_type,
            start_prob: self.start_prob.to_vec(),
            transmat: self.transmat.outer_iter().map(|r| r.to_vec()).collect(),
            means: self.emissions.iter().map(|e| e.mean().to_vec()).collect(),
            covariances: self
                .emissions
                .iter()
                .map(|e| e.covariance().outer_iter().map(|r| r.to_vec()).collect())
                .collect(),
        }
    }

    /// Rebuild from a validated parameter record.
    pub fn from_params(params: &HmmParams) -> Result<Self, FitError> {
        let k = params.n_states();
        let d = params.n_features();
        Self::build(
            params.covariance_type,
            Array1::from(params.start_prob.clone()),
            Array2::from_shape_fn((k, k), |(i, j)| params.transmat[i][j]),
            Array2::from_shape_fn((k, d), |(i, j)| params.means[i][j]),
            params
                .covariances
                .iter()
                .map(|c| Array2::from_shape_fn((d, d), |(i, j)| c[i][j]))
                .collect(),
        )
    }
}

/// Sample covariance with the `n - 1` denominator.
fn sample_covariance(obs: &Array2<f64>) -> Array2<f64> {
    let n = obs.nrows();
    let d = obs.ncols();
    let Some(mean) = obs.mean_axis(Axis(0)) else {
        return Array2::zeros((d, d));
    };
    let centered = obs - &mean;
    centered.t().dot(&centered) / (n.max(2) - 1) as f64
}

/// Restrict a full covariance to the structure of `covariance_type`.
fn shape_covariance(full: &Array2<f64>, covariance_type: CovarianceType) -> Array2<f64> {
    match covariance_type {
        CovarianceType::Full | CovarianceType::Tied => full.clone(),
        CovarianceType::Diag => Array2::from_diag(&full.diag()),
        CovarianceType::Spherical => {
            let d = full.nrows();
            let mean_var = full.diag().sum() / d.max(1) as f64;
            Array2::eye(d) * mean_var
        }
    }
}

fn shape_covariance_floored(
    full: &Array2<f64>,
    covariance_type: CovarianceType,
    min_covar: f64,
) -> Array2<f64> {
    let mut shaped = shape_covariance(full, covariance_type);
    for v in shaped.diag_mut() {
        *v = v.max(min_covar);
    }
    shaped
}

/// k-means++ seeding followed by Lloyd refinement. Returns `k x D` centroids.
fn kmeans_plus_plus(obs: &Array2<f64>, k: usize, seed: u64) -> Array2<f64> {
    let (n, d) = obs.dim();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut centers = Array2::<f64>::zeros((k, d));

    let first = rng.random_range(0..n);
    centers.row_mut(0).assign(&obs.row(first));
    let mut nearest: Vec<f64> = (0..n)
        .map(|i| squared_distance(obs, i, &centers, 0))
        .collect();

    for c in 1..k {
        let total: f64 = nearest.iter().sum();
        let chosen = if total > 0.0 && total.is_finite() {
            let target = rng.random::<f64>() * total;
            let mut cumulative = 0.0;
            let mut pick = n - 1;
            for (i, &dist) in nearest.iter().enumerate() {
                cumulative += dist;
                if cumulative > target {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            rng.random_range(0..n)
        };
        centers.row_mut(c).assign(&obs.row(chosen));
        for (i, dist) in nearest.iter_mut().enumerate() {
            *dist = dist.min(squared_distance(obs, i, &centers, c));
        }
    }

    let mut assignments = vec![usize::MAX; n];
    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;
        for (i, slot) in assignments.iter_mut().enumerate() {
            let mut best = (0, f64::INFINITY);
            for c in 0..k {
                let dist = squared_distance(obs, i, &centers, c);
                if dist < best.1 {
                    best = (c, dist);
                }
            }
            if *slot != best.0 {
                *slot = best.0;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f64>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (i, &c) in assignments.iter().enumerate() {
            let mut row = sums.row_mut(c);
            row += &obs.row(i);
            counts[c] += 1;
        }
        for c in 0..k {
            // Empty clusters keep their previous centroid
            if counts[c] > 0 {
                let mean = &sums.row(c) / counts[c] as f64;
                centers.row_mut(c).assign(&mean);
            }
        }
    }
    centers
}

fn squared_distance(obs: &Array2<f64>, i: usize, centers: &Array2<f64>, c: usize) -> f64 {
    obs.row(i)
        .iter()
        .zip(centers.row(c).iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn normal(rng: &mut StdRng) -> f64 {
        let u1: f64 = rng.random::<f64>().max(1e-12);
        let u2: f64 = rng.random();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Two well separated clusters in 2D, emitted in blocks of 50.
    fn two_regime_data() -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(7);
        let mut data = Array2::zeros((200, 2));
        for t in 0..200 {
            let center = if (t / 50) % 2 == 0 { -3.0 } else { 3.0 };
            data[[t, 0]] = center + 0.5 * normal(&mut rng);
            data[[t, 1]] = center + 0.5 * normal(&mut rng);
        }
        data
    }

    fn options(covariance_type: CovarianceType) -> HmmOptions {
        HmmOptions {
            n_states: 2,
            covariance_type,
            n_iter: 100,
            tol: 1e-4,
            min_covar: 1e-3,
            random_state: 42,
        }
    }

    #[test]
    fn test_recovers_separated_states() {
        let data = two_regime_data();
        let (hmm, report) = GaussianHmm::fit(&data, &options(CovarianceType::Full)).unwrap();
        assert!(report.converged);
        assert!(report.log_likelihood.is_finite());

        let path = hmm.decode(&data);
        // Every block of 50 decodes to a single state
        for block in path.chunks(50) {
            assert!(block.iter().all(|&s| s == block[0]));
        }
        assert_ne!(path[0], path[50]);
        assert_eq!(path[0], path[100]);

        let means = hmm.means();
        assert!((means[[path[0], 0]] + 3.0).abs() < 0.5);
        assert!((means[[path[50], 0]] - 3.0).abs() < 0.5);
    }

    #[test]
    fn test_all_covariance_types_fit() {
        let data = two_regime_data();
        for cov_type in [
            CovarianceType::Full,
            CovarianceType::Diag,
            CovarianceType::Spherical,
            CovarianceType::Tied,
        ] {
            let (hmm, _) = GaussianHmm::fit(&data, &options(cov_type)).unwrap();
            let (gamma, ll) = hmm.posteriors(&data);
            assert!(ll.is_finite(), "{}", cov_type);
            for row in gamma.rows() {
                assert!((row.sum() - 1.0).abs() < 1e-9);
            }
            for row in hmm.transmat().rows() {
                assert!((row.sum() - 1.0).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let data = two_regime_data();
        let (a, ra) = GaussianHmm::fit(&data, &options(CovarianceType::Full)).unwrap();
        let (b, rb) = GaussianHmm::fit(&data, &options(CovarianceType::Full)).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(a.to_params(), b.to_params());
    }

    #[test]
    fn test_insufficient_samples() {
        let data = Array2::zeros((2, 1));
        let mut opts = options(CovarianceType::Full);
        opts.n_states = 3;
        assert!(matches!(
            GaussianHmm::fit(&data, &opts),
            Err(FitError::InsufficientSamples { n_samples: 2, n_states: 3 })
        ));
    }

    #[test]
    fn test_iteration_cap_reports_not_converged() {
        let data = two_regime_data();
        let mut opts = options(CovarianceType::Full);
        opts.n_iter = 1;
        opts.tol = 0.0;
        let (_, report) = GaussianHmm::fit(&data, &opts).unwrap();
        assert_eq!(report.iterations, 1);
        assert!(!report.converged);
    }

    #[test]
    fn test_params_roundtrip() {
        let data = two_regime_data();
        let (hmm, _) = GaussianHmm::fit(&data, &options(CovarianceType::Diag)).unwrap();
        let restored = GaussianHmm::from_params(&hmm.to_params()).unwrap();
        assert_eq!(restored.decode(&data), hmm.decode(&data));
        assert_eq!(restored.log_likelihood(&data), hmm.log_likelihood(&data));
    }
}
