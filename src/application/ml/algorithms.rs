//! HMM inference in log space: forward-backward, expected transitions, Viterbi.
//!
//! All routines take a precomputed `T x N` matrix of emission log densities,
//! so they are independent of the emission family.

use ndarray::{Array1, Array2, Axis};

/// Numerically stable `ln(sum(exp(values)))`. Returns `-inf` when every
/// term is `-inf`.
pub fn log_sum_exp<'a>(values: impl IntoIterator<Item = &'a f64> + Clone) -> f64 {
    let max = values
        .clone()
        .into_iter()
        .fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.into_iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Element-wise natural log, mapping zero probabilities to `-inf`.
pub fn log_probs<D: ndarray::Dimension>(p: &ndarray::Array<f64, D>) -> ndarray::Array<f64, D> {
    p.mapv(|v| if v > 0.0 { v.ln() } else { f64::NEG_INFINITY })
}

/// Forward pass. Returns `log_alpha` and the total log-likelihood.
pub fn forward(
    log_start: &Array1<f64>,
    log_trans: &Array2<f64>,
    log_emissions: &Array2<f64>,
) -> (Array2<f64>, f64) {
    let (t_len, n) = log_emissions.dim();
    let mut log_alpha = Array2::from_elem((t_len, n), f64::NEG_INFINITY);
    if t_len == 0 {
        return (log_alpha, 0.0);
    }

    for j in 0..n {
        log_alpha[[0, j]] = log_start[j] + log_emissions[[0, j]];
    }

    let mut work = vec![0.0; n];
    for t in 1..t_len {
        for j in 0..n {
            for i in 0..n {
                work[i] = log_alpha[[t - 1, i]] + log_trans[[i, j]];
            }
            log_alpha[[t, j]] = log_sum_exp(&work) + log_emissions[[t, j]];
        }
    }

    let log_likelihood = log_sum_exp(log_alpha.row(t_len - 1));
    (log_alpha, log_likelihood)
}

/// Backward pass. Returns `log_beta`.
pub fn backward(log_trans: &Array2<f64>, log_emissions: &Array2<f64>) -> Array2<f64> {
    let (t_len, n) = log_emissions.dim();
    let mut log_beta = Array2::zeros((t_len, n));
    if t_len == 0 {
        return log_beta;
    }

    let mut work = vec![0.0; n];
    for t in (0..t_len - 1).rev() {
        for i in 0..n {
            for j in 0..n {
                work[j] = log_trans[[i, j]] + log_emissions[[t + 1, j]] + log_beta[[t + 1, j]];
            }
            log_beta[[t, i]] = log_sum_exp(&work);
        }
    }
    log_beta
}

/// Per-row state posteriors (gamma) from forward and backward passes.
///
/// Each row is normalized on its own, so rows sum to 1 even when the
/// overall likelihood underflows.
pub fn posteriors(log_alpha: &Array2<f64>, log_beta: &Array2<f64>) -> Array2<f64> {
    let mut gamma = log_alpha + log_beta;
    for mut row in gamma.axis_iter_mut(Axis(0)) {
        normalize_log_row(&mut row);
    }
    gamma
}

fn normalize_log_row(row: &mut ndarray::ArrayViewMut1<f64>) {
    let norm = log_sum_exp(row.view());
    row.mapv_inplace(|v| (v - norm).exp());
}

/// Expected transition counts `sum_t xi_t(i, j)`.
pub fn expected_transitions(
    log_alpha: &Array2<f64>,
    log_beta: &Array2<f64>,
    log_trans: &Array2<f64>,
    log_emissions: &Array2<f64>,
    log_likelihood: f64,
) -> Array2<f64> {
    let (t_len, n) = log_emissions.dim();
    let mut xi_sum = Array2::zeros((n, n));
    for t in 0..t_len.saturating_sub(1) {
        for i in 0..n {
            for j in 0..n {
                let log_xi = log_alpha[[t, i]]
                    + log_trans[[i, j]]
                    + log_emissions[[t + 1, j]]
                    + log_beta[[t + 1, j]]
                    - log_likelihood;
                xi_sum[[i, j]] += log_xi.exp();
            }
        }
    }
    xi_sum
}

/// Most likely state path and its joint log probability.
pub fn viterbi(
    log_start: &Array1<f64>,
    log_trans: &Array2<f64>,
    log_emissions: &Array2<f64>,
) -> (Vec<usize>, f64) {
    let (t_len, n) = log_emissions.dim();
    if t_len == 0 || n == 0 {
        return (Vec::new(), 0.0);
    }

    let mut delta = Array2::from_elem((t_len, n), f64::NEG_INFINITY);
    let mut psi = Array2::<usize>::zeros((t_len, n));

    for j in 0..n {
        delta[[0, j]] = log_start[j] + log_emissions[[0, j]];
    }

    for t in 1..t_len {
        for j in 0..n {
            let (best_state, best_val) = best_index(
                (0..n).map(|i| delta[[t - 1, i]] + log_trans[[i, j]]),
            );
            delta[[t, j]] = best_val + log_emissions[[t, j]];
            psi[[t, j]] = best_state;
        }
    }

    let (last, log_prob) = best_index(delta.row(t_len - 1).iter().copied());
    let mut path = vec![0; t_len];
    path[t_len - 1] = last;
    for t in (0..t_len - 1).rev() {
        path[t] = psi[[t + 1, path[t + 1]]];
    }
    (path, log_prob)
}

/// First index holding the maximum value.
fn best_index(values: impl Iterator<Item = f64>) -> (usize, f64) {
    let mut best = (0, f64::NEG_INFINITY);
    for (i, v) in values.enumerate() {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn toy() -> (Array1<f64>, Array2<f64>, Array2<f64>) {
        let start = log_probs(&arr1(&[0.6, 0.4]));
        let trans = log_probs(&arr2(&[[0.7, 0.3], [0.4, 0.6]]));
        // Discrete emissions for the sequence [0, 1, 0]
        let emit = log_probs(&arr2(&[[0.9, 0.2], [0.1, 0.8], [0.9, 0.2]]));
        (start, trans, emit)
    }

    #[test]
    fn test_log_sum_exp() {
        let v = [0.0_f64, 0.0];
        assert!((log_sum_exp(&v) - 2f64.ln()).abs() < 1e-12);
        let all_neg_inf = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        assert_eq!(log_sum_exp(&all_neg_inf), f64::NEG_INFINITY);
        let large = [1000.0, 1000.0];
        assert!((log_sum_exp(&large) - (1000.0 + 2f64.ln())).abs() < 1e-9);
    }

    #[test]
    fn test_forward_matches_brute_force() {
        let (start, trans, emit) = toy();
        let (_, ll) = forward(&start, &trans, &emit);

        // Enumerate all 8 paths
        let mut total = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    total += (start[a] + emit[[0, a]] + trans[[a, b]] + emit[[1, b]] + trans[[b, c]]
                        + emit[[2, c]])
                        .exp();
                }
            }
        }
        assert!((ll - total.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let (start, trans, emit) = toy();
        let (alpha, ll) = forward(&start, &trans, &emit);
        let beta = backward(&trans, &emit);
        let gamma = posteriors(&alpha, &beta);
        for row in gamma.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
        }

        // Expected transitions add up to T - 1
        let xi = expected_transitions(&alpha, &beta, &trans, &emit, ll);
        assert!((xi.sum() - 2.0).abs() < 1e-10);
    }

    #[test]
    fn test_viterbi_path() {
        let (start, trans, emit) = toy();
        let (path, log_prob) = viterbi(&start, &trans, &emit);
        assert_eq!(path, vec![0, 1, 0]);
        let expected = start[0] + emit[[0, 0]] + trans[[0, 1]] + emit[[1, 1]] + trans[[1, 0]]
            + emit[[2, 0]];
        assert!((log_prob - expected).abs() < 1e-12);
    }
}
