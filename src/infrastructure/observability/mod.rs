//! Observability for inference runs
//!
//! Metrics are collected in-process and rendered in Prometheus text format
//! on demand. Nothing listens for incoming requests.

pub mod metrics;

pub use metrics::{InferenceMetrics, MetricsObserver};
