//! Configuration domain module
//!
//! Validated value objects for the regime model and the rolling driver.
//! Loading from files and the environment lives in `crate::config`.

pub mod model_config;
pub mod rolling_config;

pub use model_config::{CovarianceType, ModelConfig};
pub use rolling_config::{ErrorPolicy, RollingConfig};
