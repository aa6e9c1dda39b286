// Feature input and regime output
pub mod feature_table;
pub mod market_regime;
