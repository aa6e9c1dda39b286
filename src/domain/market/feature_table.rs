//! Timestamp-indexed table of engineered features.
//!
//! This is the hand-off point from the upstream feature pipeline. Values may be
//! NaN during indicator warm-up; the table itself only guarantees shape and
//! index ordering.

use crate::domain::errors::InputError;
use ndarray::{Array2, ArrayView1, Axis};

/// Numeric feature columns keyed by a strictly increasing timestamp index
/// (epoch milliseconds).
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    index: Vec<i64>,
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureTable {
    pub fn new(
        index: Vec<i64>,
        columns: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, InputError> {
        if columns.is_empty() {
            return Err(InputError::NoColumns);
        }
        if values.ncols() != columns.len() {
            return Err(InputError::NotTabular {
                row: 0,
                expected: columns.len(),
                actual: values.ncols(),
            });
        }
        if index.len() != values.nrows() {
            return Err(InputError::IndexLengthMismatch {
                index_len: index.len(),
                rows: values.nrows(),
            });
        }
        for (row, pair) in index.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(InputError::NonIncreasingIndex {
                    row: row + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }

        Ok(Self {
            index,
            columns,
            values,
        })
    }

    /// Build a table from row vectors. Ragged rows are rejected.
    pub fn from_rows(
        index: Vec<i64>,
        columns: Vec<String>,
        rows: &[Vec<f64>],
    ) -> Result<Self, InputError> {
        if columns.is_empty() {
            return Err(InputError::NoColumns);
        }
        let width = columns.len();
        let mut flat = Vec::with_capacity(rows.len() * width);
        for (row, values) in rows.iter().enumerate() {
            if values.len() != width {
                return Err(InputError::NotTabular {
                    row,
                    expected: width,
                    actual: values.len(),
                });
            }
            flat.extend_from_slice(values);
        }
        let values =
            Array2::from_shape_vec((rows.len(), width), flat).map_err(|_| InputError::NotTabular {
                row: 0,
                expected: width,
                actual: 0,
            })?;
        Self::new(index, columns, values)
    }

    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self) -> &[i64] {
        &self.index
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name)
            .map(|idx| self.values.column(idx))
    }

    /// Restrict the table to the named columns, in the given order.
    pub fn select(&self, names: &[&str]) -> Result<Self, InputError> {
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let idx = self
                .column_index(name)
                .ok_or_else(|| InputError::MissingColumn {
                    name: name.to_string(),
                })?;
            positions.push(idx);
        }
        Self::new(
            self.index.clone(),
            names.iter().map(|n| n.to_string()).collect(),
            self.values.select(Axis(1), &positions),
        )
    }

    /// Rows `end + 1 - window ..= end` with every NaN-bearing row dropped.
    ///
    /// Infinite values are kept so that the model rejects them explicitly.
    pub fn dense_window(&self, end: usize, window: usize) -> Array2<f64> {
        let start = (end + 1).saturating_sub(window);
        let kept: Vec<usize> = (start..=end.min(self.len().saturating_sub(1)))
            .filter(|&row| !self.values.row(row).iter().any(|v| v.is_nan()))
            .collect();
        self.values.select(Axis(0), &kept)
    }
}
