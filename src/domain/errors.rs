use thiserror::Error;

/// Contract violations at the boundary. Always fatal for the caller.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InputError {
    #[error("Input is not tabular: row {row} has {actual} values, expected {expected}")]
    NotTabular {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Index has {index_len} entries but the table has {rows} rows")]
    IndexLengthMismatch { index_len: usize, rows: usize },

    #[error("Feature table has no columns")]
    NoColumns,

    #[error("Index must be strictly increasing: {previous} followed by {current} at row {row}")]
    NonIncreasingIndex {
        row: usize,
        previous: i64,
        current: i64,
    },

    #[error("Window must be > 1, got {window}")]
    InvalidWindow { window: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Missing required column: {name}")]
    MissingColumn { name: String },

    #[error("Input contains NaN or Inf at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },

    #[error("Need at least {required} rows, got {actual}")]
    TooFewRows { required: usize, actual: usize },

    #[error("Expected {expected} features, got {actual}")]
    FeatureCountMismatch { expected: usize, actual: usize },
}

/// Numerical failures during EM. Recoverable inside the rolling loop.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("Cannot fit {n_states} states on {n_samples} samples")]
    InsufficientSamples { n_samples: usize, n_states: usize },

    #[error("Covariance of state {state} is not positive definite")]
    SingularCovariance { state: usize },

    #[error("Non-finite {what} after EM iteration {iteration}")]
    NonFiniteParameters { what: &'static str, iteration: usize },

    #[error("Log-likelihood became non-finite at iteration {iteration}")]
    DegenerateLikelihood { iteration: usize },

    #[error("Projection failed: {reason}")]
    Projection { reason: String },
}

/// Errors surfaced by the regime model API.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("Model is not fitted. Call fit() first")]
    NotFitted,

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Fit(#[from] FitError),
}

/// Errors when saving or loading a fitted model snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Model file not found: {path}")]
    NotFound { path: String },

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported snapshot schema v{found}, expected v{expected}")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("Snapshot is inconsistent: {reason}")]
    Inconsistent { reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_formatting() {
        let err = InputError::InvalidWindow { window: 1 };
        assert_eq!(err.to_string(), "Window must be > 1, got 1");

        let err = InputError::NonFinite { row: 3, column: 1 };
        let msg = err.to_string();
        assert!(msg.contains("row 3"));
        assert!(msg.contains("column 1"));
    }

    #[test]
    fn test_model_error_wraps_fit_error() {
        let err: ModelError = FitError::SingularCovariance { state: 2 }.into();
        assert!(matches!(err, ModelError::Fit(_)));
        assert!(err.to_string().contains("state 2"));
    }

    #[test]
    fn test_snapshot_schema_formatting() {
        let err = SnapshotError::SchemaVersion {
            found: 7,
            expected: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("v7"));
        assert!(msg.contains("v1"));
    }
}
