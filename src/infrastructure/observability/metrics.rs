//! Prometheus metrics for regime inference runs
//!
//! All metrics use the `regime_` prefix and carry a `run` label so that
//! parallel batch runs share one registry.

use crate::application::ml::FitReport;
use crate::application::regimes::{InferenceObserver, RunReport, StepOutcome};
use crate::domain::errors::ModelError;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics for the inference engine
#[derive(Clone)]
pub struct InferenceMetrics {
    registry: Arc<Registry>,
    /// Refit attempts per run
    pub fit_attempts_total: CounterVec,
    /// Refits that raised a numerical error
    pub fit_failures_total: CounterVec,
    /// Refits that hit the EM iteration cap
    pub convergence_warnings_total: CounterVec,
    /// Steps committed by carrying the previous posterior
    pub recoveries_total: CounterVec,
    /// Steps left unset
    pub unset_steps_total: CounterVec,
    /// Wall time of each refit in seconds
    pub fit_duration_seconds: HistogramVec,
    /// Last committed regime per run
    pub current_regime: GaugeVec,
}

impl InferenceMetrics {
    /// Create a new metrics set with every collector registered
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let fit_attempts_total = CounterVec::new(
            Opts::new("regime_fit_attempts_total", "Total model refit attempts"),
            &["run"],
        )?;
        registry.register(Box::new(fit_attempts_total.clone()))?;

        let fit_failures_total = CounterVec::new(
            Opts::new("regime_fit_failures_total", "Total failed model refits"),
            &["run"],
        )?;
        registry.register(Box::new(fit_failures_total.clone()))?;

        let convergence_warnings_total = CounterVec::new(
            Opts::new(
                "regime_convergence_warnings_total",
                "Refits that stopped at the iteration cap",
            ),
            &["run"],
        )?;
        registry.register(Box::new(convergence_warnings_total.clone()))?;

        let recoveries_total = CounterVec::new(
            Opts::new(
                "regime_recoveries_total",
                "Steps recovered by carrying the previous posterior",
            ),
            &["run"],
        )?;
        registry.register(Box::new(recoveries_total.clone()))?;

        let unset_steps_total = CounterVec::new(
            Opts::new("regime_unset_steps_total", "Steps left without a regime"),
            &["run"],
        )?;
        registry.register(Box::new(unset_steps_total.clone()))?;

        let fit_duration_seconds = HistogramVec::new(
            HistogramOpts::new("regime_fit_duration_seconds", "Model refit duration in seconds")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["run"],
        )?;
        registry.register(Box::new(fit_duration_seconds.clone()))?;

        let current_regime = GaugeVec::new(
            Opts::new("regime_current", "Last committed regime label"),
            &["run"],
        )?;
        registry.register(Box::new(current_regime.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            fit_attempts_total,
            fit_failures_total,
            convergence_warnings_total,
            recoveries_total,
            unset_steps_total,
            fit_duration_seconds,
            current_regime,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Observer recording one run's events under the `run` label
    pub fn observer(&self, run: impl Into<String>) -> MetricsObserver {
        MetricsObserver {
            metrics: self.clone(),
            run: run.into(),
        }
    }
}

/// [`InferenceObserver`] feeding [`InferenceMetrics`] for one run.
#[derive(Clone)]
pub struct MetricsObserver {
    metrics: InferenceMetrics,
    run: String,
}

impl InferenceObserver for MetricsObserver {
    fn on_fit(&mut self, _t: usize, result: Result<&FitReport, &ModelError>, elapsed: Duration) {
        let run = [self.run.as_str()];
        self.metrics.fit_attempts_total.with_label_values(&run).inc();
        self.metrics
            .fit_duration_seconds
            .with_label_values(&run)
            .observe(elapsed.as_secs_f64());
        match result {
            Ok(report) if !report.converged => {
                self.metrics
                    .convergence_warnings_total
                    .with_label_values(&run)
                    .inc();
            }
            Ok(_) => {}
            Err(_) => self.metrics.fit_failures_total.with_label_values(&run).inc(),
        }
    }

    fn on_step(&mut self, _t: usize, outcome: StepOutcome) {
        let run = [self.run.as_str()];
        match outcome {
            StepOutcome::Committed { regime } => {
                self.metrics
                    .current_regime
                    .with_label_values(&run)
                    .set(regime as f64);
            }
            StepOutcome::Carried { regime } => {
                self.metrics.recoveries_total.with_label_values(&run).inc();
                self.metrics
                    .current_regime
                    .with_label_values(&run)
                    .set(regime as f64);
            }
            StepOutcome::Unset => self.metrics.unset_steps_total.with_label_values(&run).inc(),
        }
    }

    fn on_finish(&mut self, _report: &RunReport) {}
}
