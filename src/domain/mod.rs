// Model and driver configuration value objects
pub mod config;

// Feature tables and regime series
pub mod market;

// Model records and label alignment
pub mod ml;

// Domain-specific error types
pub mod errors;
