pub mod algorithms;
pub mod gaussian;
pub mod hmm;
pub mod predictor;
pub mod projection;
pub mod regime_model;
pub mod scaler;

pub use hmm::{FitReport, GaussianHmm, HmmOptions};
pub use predictor::RegimeEstimator;
pub use regime_model::GaussianRegimeModel;
