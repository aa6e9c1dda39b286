// Column schema a model was trained on
pub mod feature_registry;

// State relabelling across refits
pub mod label_permutation;

// Serializable fitted-model records
pub mod model_snapshot;
