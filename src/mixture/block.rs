//! Owned data blocks with a missing-cell side table.
//!
//! A block is a host copy of one `[n, d]` group of variables. Missing cells
//! are NaN in the input; they are recorded once, in row-major order, and the
//! copy is the only storage ever written by imputation or sampling. The
//! caller's tensor is left untouched.

use crate::mixture::error::{MixtureError, MixtureResult};

/// Host copy of one data block.
#[derive(Debug, Clone, PartialEq)]
pub struct DataBlock {
    name: String,
    n_rows: usize,
    n_cols: usize,
    values: Vec<f64>,
    missing: Vec<(usize, usize)>,
}

impl DataBlock {
    /// Build a block from row-major values. NaN entries are recorded as
    /// missing; infinities are rejected.
    pub fn new(
        name: impl Into<String>,
        n_rows: usize,
        n_cols: usize,
        values: Vec<f64>,
    ) -> MixtureResult<Self> {
        let name = name.into();
        if n_rows == 0 || n_cols == 0 {
            return Err(MixtureError::InvalidParameter {
                parameter: "data".to_string(),
                message: format!("block '{name}' must have at least one row and one column"),
            });
        }
        if values.len() != n_rows * n_cols {
            return Err(MixtureError::ShapeMismatch {
                expected: n_rows * n_cols,
                got: values.len(),
                context: format!("block '{name}'"),
            });
        }

        let mut missing = Vec::new();
        for (idx, &v) in values.iter().enumerate() {
            if v.is_nan() {
                missing.push((idx / n_cols, idx % n_cols));
            } else if v.is_infinite() {
                return Err(MixtureError::InvalidParameter {
                    parameter: "data".to_string(),
                    message: format!(
                        "block '{name}' has an infinite value at ({}, {})",
                        idx / n_cols,
                        idx % n_cols
                    ),
                });
            }
        }

        for j in 0..n_cols {
            if missing.iter().filter(|&&(_, c)| c == j).count() == n_rows {
                return Err(MixtureError::InvalidParameter {
                    parameter: "data".to_string(),
                    message: format!("block '{name}': column {j} has no observed value"),
                });
            }
        }

        Ok(Self {
            name,
            n_rows,
            n_cols,
            values,
            missing,
        })
    }

    /// Block name, used as its identifier inside a composer.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of samples.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of variables.
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Value of cell `(i, j)`.
    #[inline]
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n_cols + j]
    }

    /// Row `i`.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.n_cols..(i + 1) * self.n_cols]
    }

    /// All values, row-major.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Missing cells `(row, col)` in row-major order.
    pub fn missing(&self) -> &[(usize, usize)] {
        &self.missing
    }

    /// Whether `(i, j)` was missing in the input.
    pub fn is_missing(&self, i: usize, j: usize) -> bool {
        self.missing.binary_search(&(i, j)).is_ok()
    }

    /// Observed (non-missing) values of column `j`.
    pub fn observed_column(&self, j: usize) -> Vec<f64> {
        (0..self.n_rows)
            .filter(|&i| !self.is_missing(i, j))
            .map(|i| self.value(i, j))
            .collect()
    }

    /// Overwrite a missing cell. Observed cells are never written.
    pub(crate) fn set_missing_value(&mut self, i: usize, j: usize, v: f64) {
        debug_assert!(self.is_missing(i, j));
        self.values[i * self.n_cols + j] = v;
    }
}
