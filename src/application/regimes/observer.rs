//! Progress and event hooks for the rolling inference loop.
//!
//! The driver never touches global logging state on its own behalf: every
//! event goes through an explicitly passed observer.

use super::rolling_inference::RunReport;
use crate::application::ml::FitReport;
use crate::domain::errors::ModelError;
use std::time::Duration;
use tracing::info;

/// What happened at one timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A fresh posterior was committed
    Committed { regime: usize },
    /// The previous smoothed posterior was reused
    Carried { regime: usize },
    /// Nothing was written for this timestep
    Unset,
}

/// Receives rolling-inference events. Every hook defaults to a no-op.
pub trait InferenceObserver {
    /// `total_steps` is the number of timesteps the loop will visit.
    fn on_start(&mut self, _n_rows: usize, _total_steps: usize) {}

    /// A refit attempt at row `t` finished.
    fn on_fit(&mut self, _t: usize, _result: Result<&FitReport, &ModelError>, _elapsed: Duration) {}

    fn on_step(&mut self, _t: usize, _outcome: StepOutcome) {}

    fn on_finish(&mut self, _report: &RunReport) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl InferenceObserver for NoopObserver {}

impl<T: InferenceObserver + ?Sized> InferenceObserver for &mut T {
    fn on_start(&mut self, n_rows: usize, total_steps: usize) {
        (**self).on_start(n_rows, total_steps);
    }

    fn on_fit(&mut self, t: usize, result: Result<&FitReport, &ModelError>, elapsed: Duration) {
        (**self).on_fit(t, result, elapsed);
    }

    fn on_step(&mut self, t: usize, outcome: StepOutcome) {
        (**self).on_step(t, outcome);
    }

    fn on_finish(&mut self, report: &RunReport) {
        (**self).on_finish(report);
    }
}

/// Fan events out to two observers.
impl<A: InferenceObserver, B: InferenceObserver> InferenceObserver for (A, B) {
    fn on_start(&mut self, n_rows: usize, total_steps: usize) {
        self.0.on_start(n_rows, total_steps);
        self.1.on_start(n_rows, total_steps);
    }

    fn on_fit(&mut self, t: usize, result: Result<&FitReport, &ModelError>, elapsed: Duration) {
        self.0.on_fit(t, result, elapsed);
        self.1.on_fit(t, result, elapsed);
    }

    fn on_step(&mut self, t: usize, outcome: StepOutcome) {
        self.0.on_step(t, outcome);
        self.1.on_step(t, outcome);
    }

    fn on_finish(&mut self, report: &RunReport) {
        self.0.on_finish(report);
        self.1.on_finish(report);
    }
}

/// Logs a progress line every 10% of the run when verbose.
#[derive(Debug, Clone)]
pub struct TracingProgress {
    label: String,
    verbose: bool,
    total_steps: usize,
    done: usize,
    next_decile: usize,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>, verbose: bool) -> Self {
        Self {
            label: label.into(),
            verbose,
            total_steps: 0,
            done: 0,
            next_decile: 1,
        }
    }
}

impl InferenceObserver for TracingProgress {
    fn on_start(&mut self, n_rows: usize, total_steps: usize) {
        self.total_steps = total_steps;
        self.done = 0;
        self.next_decile = 1;
        if self.verbose {
            info!(
                "[{}] Rolling inference over {} rows ({} steps)",
                self.label, n_rows, total_steps
            );
        }
    }

    fn on_step(&mut self, _t: usize, _outcome: StepOutcome) {
        self.done += 1;
        if !self.verbose || self.total_steps == 0 {
            return;
        }
        while self.next_decile <= 10 && self.done * 10 >= self.next_decile * self.total_steps {
            info!(
                "[{}] Rolling inference {}% ({}/{})",
                self.label,
                self.next_decile * 10,
                self.done,
                self.total_steps
            );
            self.next_decile += 1;
        }
    }

    fn on_finish(&mut self, report: &RunReport) {
        if self.verbose {
            info!("[{}] Rolling inference finished: {}", self.label, report);
        }
    }
}
