pub mod observability;
pub mod persistence;

pub use observability::InferenceMetrics;
pub use persistence::ModelStore;
