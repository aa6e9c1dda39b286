pub mod diagnostics;
pub mod observer;
pub mod rolling_inference;

pub use observer::{InferenceObserver, NoopObserver, StepOutcome, TracingProgress};
pub use rolling_inference::{RegimeRun, RollingRegimeInference, RunReport};
