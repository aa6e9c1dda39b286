//! Descriptive statistics over a committed regime series.

use crate::domain::errors::InputError;
use crate::domain::market::feature_table::FeatureTable;
use crate::domain::market::market_regime::RegimeSeries;
use ndarray::Array2;
use statrs::statistics::{Data, Median, Statistics};

/// Run-length summary for one regime.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDuration {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub max: Option<usize>,
    pub count_runs: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeStats {
    pub transition_matrix: Array2<f64>,
    pub durations: Vec<StateDuration>,
    pub state_counts: Vec<usize>,
    pub feature_names: Vec<String>,
    /// Column means of the features over each state's rows, NaN skipped.
    /// `None` for states that never occur.
    pub per_state_means: Vec<Option<Vec<f64>>>,
}

/// Empirical transition matrix between consecutive committed regimes.
///
/// Unset rows are dropped before counting, so a gap does not break the
/// sequence. Rows are normalized to 1; a state with no outgoing transition
/// keeps an all-zero row.
pub fn transition_matrix(regimes: &[Option<usize>], n_components: usize) -> Array2<f64> {
    let committed: Vec<usize> = regimes
        .iter()
        .flatten()
        .copied()
        .filter(|&s| s < n_components)
        .collect();

    let mut counts = Array2::<f64>::zeros((n_components, n_components));
    for pair in committed.windows(2) {
        counts[[pair[0], pair[1]]] += 1.0;
    }
    for mut row in counts.rows_mut() {
        let total = row.sum();
        if total > 0.0 {
            row /= total;
        }
    }
    counts
}

/// Run lengths per regime. An unset row ends the current run.
pub fn state_durations(regimes: &[Option<usize>], n_components: usize) -> Vec<StateDuration> {
    let mut runs: Vec<Vec<usize>> = vec![Vec::new(); n_components];
    let mut current: Option<(usize, usize)> = None;

    for regime in regimes {
        match (*regime, current) {
            (Some(s), Some((state, len))) if s == state => current = Some((state, len + 1)),
            (next, finished) => {
                if let Some((state, len)) = finished
                    && state < n_components
                {
                    runs[state].push(len);
                }
                current = next.map(|s| (s, 1));
            }
        }
    }
    if let Some((state, len)) = current
        && state < n_components
    {
        runs[state].push(len);
    }

    runs.into_iter()
        .map(|lengths| {
            if lengths.is_empty() {
                return StateDuration {
                    mean: None,
                    median: None,
                    max: None,
                    count_runs: 0,
                };
            }
            let as_f64: Vec<f64> = lengths.iter().map(|&l| l as f64).collect();
            StateDuration {
                mean: Some(as_f64.iter().mean()),
                median: Some(Data::new(as_f64.clone()).median()),
                max: lengths.iter().max().copied(),
                count_runs: lengths.len(),
            }
        })
        .collect()
}

/// Transition matrix, durations, counts and per-state feature means.
pub fn regime_stats(features: &FeatureTable, series: &RegimeSeries) -> Result<RegimeStats, InputError> {
    if features.len() != series.len() {
        return Err(InputError::IndexLengthMismatch {
            index_len: series.len(),
            rows: features.len(),
        });
    }

    let n_components = series.n_components();
    let regimes = series.regimes();

    let mut state_counts = vec![0usize; n_components];
    for s in regimes.iter().flatten() {
        if *s < n_components {
            state_counts[*s] += 1;
        }
    }

    let values = features.values();
    let per_state_means = (0..n_components)
        .map(|state| {
            if state_counts[state] == 0 {
                return None;
            }
            let means = values
                .columns()
                .into_iter()
                .map(|column| {
                    let members: Vec<f64> = column
                        .iter()
                        .zip(regimes.iter())
                        .filter(|&(v, r)| *r == Some(state) && !v.is_nan())
                        .map(|(&v, _)| v)
                        .collect();
                    if members.is_empty() {
                        f64::NAN
                    } else {
                        members.iter().mean()
                    }
                })
                .collect();
            Some(means)
        })
        .collect();

    Ok(RegimeStats {
        transition_matrix: transition_matrix(&regimes, n_components),
        durations: state_durations(&regimes, n_components),
        state_counts,
        feature_names: features.columns().to_vec(),
        per_state_means,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::market_regime::Posterior;

    fn regimes(raw: &[i32]) -> Vec<Option<usize>> {
        raw.iter()
            .map(|&r| if r < 0 { None } else { Some(r as usize) })
            .collect()
    }

    #[test]
    fn test_transition_matrix_rows() {
        let r = regimes(&[0, 0, 1, 1, 0, -1, 0]);
        let m = transition_matrix(&r, 3);
        // 0->0 twice (one across the gap), 0->1 once, 1->1 once, 1->0 once
        assert!((m[[0, 0]] - 2.0 / 3.0).abs() < 1e-12);
        assert!((m[[0, 1]] - 1.0 / 3.0).abs() < 1e-12);
        assert!((m[[1, 0]] - 0.5).abs() < 1e-12);
        assert!((m[[1, 1]] - 0.5).abs() < 1e-12);
        // State 2 never occurs
        assert_eq!(m.row(2).sum(), 0.0);
    }

    #[test]
    fn test_durations_split_on_unset() {
        let r = regimes(&[-1, 1, 1, 1, -1, 1, 0, 0, 1]);
        let d = state_durations(&r, 3);

        assert_eq!(d[1].count_runs, 3);
        assert_eq!(d[1].max, Some(3));
        assert!((d[1].mean.unwrap() - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(d[1].median, Some(1.0));

        assert_eq!(d[0].count_runs, 1);
        assert_eq!(d[0].max, Some(2));

        assert_eq!(d[2].count_runs, 0);
        assert_eq!(d[2].mean, None);
    }

    #[test]
    fn test_regime_stats() {
        let table = FeatureTable::from_rows(
            vec![1, 2, 3, 4],
            vec!["vol".to_string()],
            &[vec![1.0], vec![3.0], vec![10.0], vec![f64::NAN]],
        )
        .unwrap();
        let mut series = RegimeSeries::unset(table.index().to_vec(), 2);
        series.commit(1, Posterior::new(vec![0.9, 0.1]));
        series.commit(2, Posterior::new(vec![0.2, 0.8]));
        series.commit(3, Posterior::new(vec![0.3, 0.7]));

        let stats = regime_stats(&table, &series).unwrap();
        assert_eq!(stats.state_counts, vec![1, 2]);
        assert_eq!(stats.per_state_means[0], Some(vec![3.0]));
        // The NaN row in state 1 is skipped
        assert_eq!(stats.per_state_means[1], Some(vec![10.0]));
        assert_eq!(stats.durations.len(), 2);
    }

    #[test]
    fn test_regime_stats_length_mismatch() {
        let table =
            FeatureTable::from_rows(vec![1, 2], vec!["vol".to_string()], &[vec![1.0], vec![2.0]])
                .unwrap();
        let series = RegimeSeries::unset(vec![1], 2);
        assert!(regime_stats(&table, &series).is_err());
    }
}
