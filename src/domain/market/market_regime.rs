use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the assigned-regime output column.
pub const REGIME_COLUMN: &str = "regime";

/// Name of the probability column for sorted state `i`.
pub fn proba_column_name(i: usize) -> String {
    format!("regime_proba_{}", i)
}

/// Probability distribution over the sorted regime states at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior(Vec<f64>);

impl Posterior {
    pub fn new(probabilities: Vec<f64>) -> Self {
        Self(probabilities)
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_nan(&self) -> bool {
        self.0.iter().any(|p| p.is_nan())
    }

    pub fn is_finite(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|p| p.is_finite())
    }

    /// Index of the largest component. The first index wins on ties.
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &p) in self.0.iter().enumerate() {
            if p > self.0[best] {
                best = i;
            }
        }
        best
    }

    /// Exponential blend `alpha * self + (1 - alpha) * previous`.
    pub fn blend(&self, alpha: f64, previous: &Posterior) -> Posterior {
        Posterior(
            self.0
                .iter()
                .zip(previous.0.iter())
                .map(|(current, prev)| alpha * current + (1.0 - alpha) * prev)
                .collect(),
        )
    }
}

/// A committed regime decision: the argmax state and the distribution it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeAssignment {
    pub regime: usize,
    pub posterior: Posterior,
}

impl fmt::Display for RegimeAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{} (p={:.3})", self.regime, self.posterior.0[self.regime])
    }
}

/// Per-timestamp regime output, aligned one-to-one with the input index.
///
/// Rows that could not be resolved stay `None`; no value is ever fabricated
/// for them.
#[derive(Debug, Clone, PartialEq)]
pub struct RegimeSeries {
    index: Vec<i64>,
    n_components: usize,
    rows: Vec<Option<RegimeAssignment>>,
}

impl RegimeSeries {
    /// A series of the given index with every row unset.
    pub fn unset(index: Vec<i64>, n_components: usize) -> Self {
        let rows = vec![None; index.len()];
        Self {
            index,
            n_components,
            rows,
        }
    }

    /// Record `posterior` at row `t`, assigning its argmax as the regime.
    pub fn commit(&mut self, t: usize, posterior: Posterior) {
        if let Some(slot) = self.rows.get_mut(t) {
            *slot = Some(RegimeAssignment {
                regime: posterior.argmax(),
                posterior,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn rows(&self) -> &[Option<RegimeAssignment>] {
        &self.rows
    }

    pub fn get(&self, t: usize) -> Option<&RegimeAssignment> {
        self.rows.get(t).and_then(|r| r.as_ref())
    }

    /// The `regime` column, `None` where unset.
    pub fn regimes(&self) -> Vec<Option<usize>> {
        self.rows
            .iter()
            .map(|r| r.as_ref().map(|a| a.regime))
            .collect()
    }

    pub fn probability_columns(&self) -> Vec<String> {
        (0..self.n_components).map(proba_column_name).collect()
    }

    pub fn committed_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    pub fn unset_count(&self) -> usize {
        self.rows.len() - self.committed_count()
    }
}
