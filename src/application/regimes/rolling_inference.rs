//! Walk-forward regime inference over a feature table.
//!
//! For each timestep `t >= window - 1` the driver takes the trailing window,
//! drops NaN rows, refits on schedule, and commits the last-row posterior in
//! sorted-label order. Numerical failures are isolated per timestep: the last
//! smoothed posterior is carried forward under [`ErrorPolicy::Carry`], and the
//! row is left unset otherwise.
//!
//! The refit window at `t` includes the observation at `t`, so model
//! parameters see one step of look-ahead relative to strict walk-forward.

use super::observer::{InferenceObserver, NoopObserver, StepOutcome};
use crate::application::ml::{FitReport, GaussianRegimeModel, RegimeEstimator};
use crate::domain::config::{ErrorPolicy, ModelConfig, RollingConfig};
use crate::domain::errors::{InputError, ModelError};
use crate::domain::market::feature_table::FeatureTable;
use crate::domain::market::market_regime::{Posterior, RegimeSeries};
use crate::domain::ml::label_permutation::StateLabelPermutation;
use ndarray::Array2;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub fit_attempts: usize,
    pub fits: usize,
    pub fit_failures: usize,
    /// Successful fits that hit the iteration cap
    pub convergence_warnings: usize,
    /// Steps committed by carrying the previous smoothed posterior
    pub recoveries: usize,
    /// Visited steps left unset
    pub unset: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "fits {}/{} ({} failed, {} not converged), {} recovered, {} unset",
            self.fits,
            self.fit_attempts,
            self.fit_failures,
            self.convergence_warnings,
            self.recoveries,
            self.unset
        )
    }
}

/// Output of one run.
#[derive(Debug, Clone)]
pub struct RegimeRun<M = GaussianRegimeModel> {
    pub series: RegimeSeries,
    pub report: RunReport,
    /// Model active at the end of the run, if any fit succeeded
    pub model: Option<M>,
    /// Label permutation paired with `model`
    pub permutation: Option<StateLabelPermutation>,
}

/// Rolling-window regime inference driver.
#[derive(Debug, Clone)]
pub struct RollingRegimeInference {
    model_config: ModelConfig,
    rolling: RollingConfig,
}

impl RollingRegimeInference {
    pub fn new(model_config: ModelConfig, rolling: RollingConfig) -> Result<Self, InputError> {
        model_config.validate()?;
        rolling.validate()?;
        Ok(Self {
            model_config,
            rolling,
        })
    }

    pub fn model_config(&self) -> &ModelConfig {
        &self.model_config
    }

    pub fn rolling_config(&self) -> &RollingConfig {
        &self.rolling
    }

    pub fn run(&self, table: &FeatureTable) -> Result<RegimeRun, InputError> {
        self.run_observed(table, &mut NoopObserver)
    }

    /// Run with [`GaussianRegimeModel`], reporting events to `observer`.
    pub fn run_observed<O: InferenceObserver + ?Sized>(
        &self,
        table: &FeatureTable,
        observer: &mut O,
    ) -> Result<RegimeRun, InputError> {
        let config = self.model_config.clone();
        let names = table.columns().to_vec();
        self.run_with(table, observer, || {
            GaussianRegimeModel::new(config.clone())
                .with_feature_names(names.clone())
                .quiet_convergence()
        })
    }

    /// Run with models produced by `make_model`, one per refit.
    pub fn run_with<M, O, F>(
        &self,
        table: &FeatureTable,
        observer: &mut O,
        mut make_model: F,
    ) -> Result<RegimeRun<M>, InputError>
    where
        M: RegimeEstimator,
        O: InferenceObserver + ?Sized,
        F: FnMut() -> M,
    {
        self.rolling.validate()?;
        self.model_config.validate()?;

        let window = self.rolling.window;
        let n_components = self.model_config.n_components;
        let n = table.len();
        let total_steps = n.saturating_sub(window - 1);
        let sort_column = self.resolve_sort_column(table);

        info!(
            "Starting rolling inference: {} rows, window {}, refit every {}, {} states",
            n, window, self.rolling.refit_interval, n_components
        );
        observer.on_start(n, total_steps);

        let mut series = RegimeSeries::unset(table.index().to_vec(), n_components);
        let mut report = RunReport::default();
        let mut active: Option<(M, StateLabelPermutation)> = None;
        let mut previous: Option<Posterior> = None;

        for t in (window - 1)..n {
            let dense = table.dense_window(t, window);
            if dense.nrows() < 2 {
                report.unset += 1;
                observer.on_step(t, StepOutcome::Unset);
                continue;
            }

            let should_refit =
                active.is_none() || (t - (window - 1)) % self.rolling.refit_interval == 0;

            let mut fit_failure = None;
            if should_refit {
                report.fit_attempts += 1;
                let started = Instant::now();
                match refit(&dense, sort_column, &mut make_model) {
                    Ok((model, permutation, fit_report)) => {
                        report.fits += 1;
                        if !fit_report.converged {
                            report.convergence_warnings += 1;
                        }
                        observer.on_fit(t, Ok(&fit_report), started.elapsed());
                        active = Some((model, permutation));
                    }
                    Err(e) => {
                        report.fit_failures += 1;
                        debug!("Refit at row {} failed: {}", t, e);
                        observer.on_fit(t, Err(&e), started.elapsed());
                        fit_failure = Some(e);
                    }
                }
            }

            let step = match (fit_failure, &active) {
                (Some(e), _) => Err(e),
                (None, Some((model, permutation))) => {
                    last_posterior(model, permutation, &dense, n_components)
                }
                (None, None) => Err(ModelError::NotFitted),
            };

            let outcome = match step {
                Ok(posterior) => self.commit(t, posterior, &mut previous, &mut series),
                Err(e) => {
                    debug!("Inference at row {} failed: {}", t, e);
                    self.recover(t, previous.as_ref(), &mut series)
                }
            };
            match outcome {
                StepOutcome::Committed { .. } => {}
                StepOutcome::Carried { .. } => report.recoveries += 1,
                StepOutcome::Unset => report.unset += 1,
            }
            observer.on_step(t, outcome);
        }

        if report.convergence_warnings > 0 {
            warn!(
                "{} of {} refits hit the iteration cap ({}) without converging",
                report.convergence_warnings, report.fits, self.model_config.n_iter
            );
        }
        info!("Rolling inference finished: {}", report);
        observer.on_finish(&report);

        let (model, permutation) = match active {
            Some((model, permutation)) => (Some(model), Some(permutation)),
            None => (None, None),
        };
        Ok(RegimeRun {
            series,
            report,
            model,
            permutation,
        })
    }

    /// Column index of the sort feature, resolved once per run.
    fn resolve_sort_column(&self, table: &FeatureTable) -> Option<usize> {
        let name = self.rolling.sort_by.as_deref()?;
        let column = table.column_index(name);
        if column.is_none() {
            warn!(
                "Sort column '{}' not found in features; state labels stay unsorted",
                name
            );
        }
        column
    }

    /// Validity check, smoothing and commit for a freshly inferred posterior.
    fn commit(
        &self,
        t: usize,
        posterior: Posterior,
        previous: &mut Option<Posterior>,
        series: &mut RegimeSeries,
    ) -> StepOutcome {
        let (candidate, carried) = if posterior.has_nan() {
            match previous.as_ref() {
                Some(prev) if self.rolling.on_error == ErrorPolicy::Carry => (prev.clone(), true),
                _ => return StepOutcome::Unset,
            }
        } else {
            (posterior, false)
        };

        let smoothed = match (self.rolling.smooth_alpha, previous.as_ref()) {
            (Some(alpha), Some(prev)) if !carried => candidate.blend(alpha, prev),
            _ => candidate,
        };
        if !smoothed.is_finite() {
            return StepOutcome::Unset;
        }

        let regime = smoothed.argmax();
        series.commit(t, smoothed.clone());
        *previous = Some(smoothed);
        if carried {
            StepOutcome::Carried { regime }
        } else {
            StepOutcome::Committed { regime }
        }
    }

    fn recover(
        &self,
        t: usize,
        previous: Option<&Posterior>,
        series: &mut RegimeSeries,
    ) -> StepOutcome {
        match previous {
            Some(prev) if self.rolling.on_error == ErrorPolicy::Carry => {
                let regime = prev.argmax();
                series.commit(t, prev.clone());
                StepOutcome::Carried { regime }
            }
            _ => StepOutcome::Unset,
        }
    }
}

/// Fit a fresh model and derive its label permutation on the same window.
/// Either both succeed or neither is returned.
fn refit<M, F>(
    dense: &Array2<f64>,
    sort_column: Option<usize>,
    make_model: &mut F,
) -> Result<(M, StateLabelPermutation, FitReport), ModelError>
where
    M: RegimeEstimator,
    F: FnMut() -> M,
{
    let mut model = make_model();
    let fit_report = model.fit(dense)?;
    let permutation = match sort_column {
        Some(column) => {
            let states = model.predict(dense)?;
            let values = dense.column(column).to_vec();
            StateLabelPermutation::from_decoded_states(&states, &values, model.n_states())
        }
        None => StateLabelPermutation::identity(model.n_states()),
    };
    Ok((model, permutation, fit_report))
}

/// Posterior of the window's last row, in sorted-label order.
fn last_posterior<M: RegimeEstimator>(
    model: &M,
    permutation: &StateLabelPermutation,
    dense: &Array2<f64>,
    n_components: usize,
) -> Result<Posterior, ModelError> {
    let proba = model.predict_proba(dense)?;
    if proba.ncols() != n_components || permutation.len() != n_components {
        return Err(InputError::FeatureCountMismatch {
            expected: n_components,
            actual: proba.ncols(),
        }
        .into());
    }
    let last = proba
        .rows()
        .into_iter()
        .last()
        .ok_or(InputError::TooFewRows {
            required: 1,
            actual: 0,
        })?;
    Ok(Posterior::new(permutation.reorder(&last.to_vec())))
}
