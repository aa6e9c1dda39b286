// Model building blocks and the Gaussian regime model
pub mod ml;

// Walk-forward inference driver and diagnostics
pub mod regimes;
