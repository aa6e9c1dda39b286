//! Realignment of HMM state labels across independent refits.
//!
//! EM assigns state indices arbitrarily, so two fits on overlapping windows can
//! swap the meaning of "state 0" and "state 1". Ranking states by the mean of
//! a chosen feature gives every refit the same semantic ordering.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Bijection from raw HMM state indices to sorted labels.
///
/// `order[sorted] = raw`: sorted label `i` is raw state `order[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateLabelPermutation {
    order: Vec<usize>,
}

impl StateLabelPermutation {
    pub fn identity(n_states: usize) -> Self {
        Self {
            order: (0..n_states).collect(),
        }
    }

    /// Rank states by ascending mean. NaN means rank with +infinity.
    /// Equal means keep their raw order.
    pub fn from_state_means(means: &[f64]) -> Self {
        let key = |raw: usize| {
            let m = means[raw];
            if m.is_nan() { f64::INFINITY } else { m }
        };
        let mut order: Vec<usize> = (0..means.len()).collect();
        order.sort_by(|&a, &b| key(a).total_cmp(&key(b)));
        Self { order }
    }

    /// Rank states by the mean of `values` over the rows decoded into each
    /// state. States never visited rank last.
    pub fn from_decoded_states(states: &[usize], values: &[f64], n_states: usize) -> Self {
        let means: Vec<f64> = (0..n_states)
            .map(|s| {
                let members: Vec<f64> = states
                    .iter()
                    .zip(values.iter())
                    .filter(|&(&state, _)| state == s)
                    .map(|(_, &v)| v)
                    .collect();
                if members.is_empty() {
                    f64::INFINITY
                } else {
                    members.iter().mean()
                }
            })
            .collect();
        Self::from_state_means(&means)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn is_identity(&self) -> bool {
        self.order.iter().enumerate().all(|(i, &raw)| i == raw)
    }

    /// Sorted label of raw state `raw`.
    pub fn sorted_label(&self, raw: usize) -> Option<usize> {
        self.order.iter().position(|&r| r == raw)
    }

    /// Reorder one row of raw-state values into sorted-label order.
    pub fn reorder(&self, raw: &[f64]) -> Vec<f64> {
        self.order
            .iter()
            .map(|&r| raw.get(r).copied().unwrap_or(f64::NAN))
            .collect()
    }
}
