pub mod feature_csv;
pub mod model_store;

pub use feature_csv::{read_feature_table, write_regime_series};
pub use model_store::ModelStore;
