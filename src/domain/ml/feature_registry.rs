use crate::domain::errors::InputError;
use crate::domain::market::feature_table::FeatureTable;

/// Ordered list of feature names a model was trained on.
///
/// A saved model only knows column positions, so any table fed to it later
/// must present the same columns in the same order. Any change here is a
/// breaking change for saved models.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn from_table(table: &FeatureTable) -> Self {
        Self::new(table.columns().to_vec())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Reorder `table` to match the schema. Extra columns are dropped;
    /// missing ones are an error.
    pub fn align(&self, table: &FeatureTable) -> Result<FeatureTable, InputError> {
        if table.columns() == self.names.as_slice() {
            return Ok(table.clone());
        }
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        table.select(&names)
    }
}
