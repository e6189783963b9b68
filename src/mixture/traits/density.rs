//! Density model contract and parameter containers.

use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Random generator used by every stochastic step.
pub type MixtureRng = rand_chacha::ChaCha8Rng;

/// Identifier of a density family and its tying structure.
///
/// The suffix names which parameters are free: `jk` varies with cluster and
/// variable, `k` with cluster only, `j` with variable only, none means one
/// value shared by every cluster and variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ModelId {
    /// Diagonal Gaussian, variance per cluster and variable.
    GaussianSjk,
    /// Diagonal Gaussian, one variance per cluster.
    GaussianSk,
    /// Diagonal Gaussian, one variance per variable shared across clusters.
    GaussianSj,
    /// Diagonal Gaussian, one variance overall.
    GaussianS,
    /// Gamma, shape and scale per cluster and variable.
    GammaAjkBjk,
    /// Gamma, shape and scale per cluster.
    GammaAkBk,
    /// Poisson, intensity per cluster and variable.
    PoissonLjk,
    /// Poisson, one intensity per cluster.
    PoissonLk,
    /// Categorical, probability table per cluster and variable.
    CategoricalPjk,
}

impl ModelId {
    /// Every model shipped with the crate.
    pub const ALL: [ModelId; 9] = [
        ModelId::GaussianSjk,
        ModelId::GaussianSk,
        ModelId::GaussianSj,
        ModelId::GaussianS,
        ModelId::GammaAjkBjk,
        ModelId::GammaAkBk,
        ModelId::PoissonLjk,
        ModelId::PoissonLk,
        ModelId::CategoricalPjk,
    ];

    /// Canonical lower-case name, e.g. `gaussian_sjk`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GaussianSjk => "gaussian_sjk",
            Self::GaussianSk => "gaussian_sk",
            Self::GaussianSj => "gaussian_sj",
            Self::GaussianS => "gaussian_s",
            Self::GammaAjkBjk => "gamma_ajk_bjk",
            Self::GammaAkBk => "gamma_ak_bk",
            Self::PoissonLjk => "poisson_ljk",
            Self::PoissonLk => "poisson_lk",
            Self::CategoricalPjk => "categorical_pjk",
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelId {
    type Err = MixtureError;

    fn from_str(s: &str) -> MixtureResult<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|id| id.name() == lower)
            .ok_or(MixtureError::UnknownModel { name: s.to_string() })
    }
}

/// One named parameter table, stored row-major as `[rows, cols]`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterArray {
    /// Parameter name, e.g. `mean` or `sigma2`.
    pub name: String,
    /// Number of rows (usually clusters, or 1 when shared across clusters).
    pub rows: usize,
    /// Number of columns (usually variables, or 1 when shared across variables).
    pub cols: usize,
    /// Row-major values, `rows * cols` long.
    pub values: Vec<f64>,
}

impl ParameterArray {
    /// Build a table, checking that `values` has `rows * cols` entries.
    pub fn new(
        name: impl Into<String>,
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    ) -> MixtureResult<Self> {
        let name = name.into();
        if values.len() != rows * cols {
            return Err(MixtureError::ShapeMismatch {
                expected: rows * cols,
                got: values.len(),
                context: format!("parameter '{name}'"),
            });
        }
        Ok(Self {
            name,
            rows,
            cols,
            values,
        })
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }
}

/// Shape descriptor of one parameter table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterShape {
    /// Parameter name.
    pub name: String,
    /// Rows of the table.
    pub rows: usize,
    /// Columns of the table.
    pub cols: usize,
}

/// Ordered shape of a family's parameters.
///
/// A density model reports its layout so that the accumulator (and any host
/// exchanging parameter arrays) can mirror it without knowing the family.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterLayout {
    shapes: Vec<ParameterShape>,
}

impl ParameterLayout {
    /// Layout from `(name, rows, cols)` triples.
    pub fn new<S: Into<String>>(entries: impl IntoIterator<Item = (S, usize, usize)>) -> Self {
        Self {
            shapes: entries
                .into_iter()
                .map(|(name, rows, cols)| ParameterShape {
                    name: name.into(),
                    rows,
                    cols,
                })
                .collect(),
        }
    }

    /// Shapes in declaration order.
    pub fn shapes(&self) -> &[ParameterShape] {
        &self.shapes
    }

    /// Total number of leaf values.
    pub fn len(&self) -> usize {
        self.shapes.iter().map(|s| s.rows * s.cols).sum()
    }

    /// Whether the layout holds no values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parameters of one density model: ordered named tables.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ParameterSet {
    arrays: Vec<ParameterArray>,
}

impl ParameterSet {
    /// Wrap a list of tables.
    pub fn new(arrays: Vec<ParameterArray>) -> Self {
        Self { arrays }
    }

    /// Rebuild a set from a layout and flat row-major values, in layout order.
    pub fn from_flat(layout: &ParameterLayout, values: &[f64]) -> MixtureResult<Self> {
        if values.len() != layout.len() {
            return Err(MixtureError::ShapeMismatch {
                expected: layout.len(),
                got: values.len(),
                context: "flat parameter values".to_string(),
            });
        }
        let mut offset = 0;
        let mut arrays = Vec::with_capacity(layout.shapes().len());
        for shape in layout.shapes() {
            let len = shape.rows * shape.cols;
            arrays.push(ParameterArray {
                name: shape.name.clone(),
                rows: shape.rows,
                cols: shape.cols,
                values: values[offset..offset + len].to_vec(),
            });
            offset += len;
        }
        Ok(Self { arrays })
    }

    /// Tables in declaration order.
    pub fn arrays(&self) -> &[ParameterArray] {
        &self.arrays
    }

    /// Table by name.
    pub fn get(&self, name: &str) -> Option<&ParameterArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    /// Table by name, or `InvalidParameter` when absent.
    pub fn require(&self, name: &str) -> MixtureResult<&ParameterArray> {
        self.get(name).ok_or_else(|| MixtureError::InvalidParameter {
            parameter: name.to_string(),
            message: "missing from parameter set".to_string(),
        })
    }

    /// Shape of this set.
    pub fn layout(&self) -> ParameterLayout {
        ParameterLayout::new(
            self.arrays
                .iter()
                .map(|a| (a.name.clone(), a.rows, a.cols)),
        )
    }

    /// All leaf values in layout order.
    pub fn flatten(&self) -> Vec<f64> {
        self.arrays
            .iter()
            .flat_map(|a| a.values.iter().copied())
            .collect()
    }

    /// Fail with `ShapeMismatch` unless this set has exactly `layout`.
    pub fn check_layout(&self, layout: &ParameterLayout, context: &str) -> MixtureResult<()> {
        if self.layout() != *layout {
            return Err(MixtureError::ShapeMismatch {
                expected: layout.len(),
                got: self.layout().len(),
                context: format!("{context}: parameter layout differs"),
            });
        }
        Ok(())
    }
}

/// Contract implemented by every density family.
///
/// A model owns its parameters and reads the data block it is handed; it
/// never stores the data. Responsibilities arrive as a row-major `[n, K]`
/// slice and cluster counts as a length-`K` slice.
///
/// `log_density` returns NaN when the parameters of cluster `k` are
/// degenerate (zero variance, non-positive rate). Callers skip NaN terms.
/// A log density of negative infinity is a genuine zero probability and is
/// kept.
///
/// `run` must leave the parameters untouched when it fails: compute into
/// scratch buffers, validate, then commit.
pub trait DensityModel: Send + Sync + fmt::Debug {
    /// Family and tying structure.
    fn id(&self) -> ModelId;

    /// Number of clusters the parameters are shaped for.
    fn n_cluster(&self) -> usize;

    /// Shape of the parameter set returned by [`DensityModel::parameters`].
    fn layout(&self) -> ParameterLayout;

    /// Size the parameters for `data` and give them deterministic defaults.
    fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()>;

    /// Log-probability of sample `i` under cluster `k`.
    fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64;

    /// Draw randomized starting parameters.
    fn random_init(
        &mut self,
        data: &DataBlock,
        tik: &[f64],
        nk: &[f64],
        rng: &mut MixtureRng,
    ) -> MixtureResult<()>;

    /// Re-estimate parameters from responsibilities (M-step).
    fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()>;

    /// Point estimate of missing cell `(i, j)` given cluster weights.
    fn impute(&self, data: &DataBlock, i: usize, j: usize, weights: &[f64]) -> f64;

    /// Random draw for missing cell `(i, j)`: first a cluster from
    /// `weights`, then a value from that cluster's distribution.
    fn sample(
        &self,
        data: &DataBlock,
        i: usize,
        j: usize,
        weights: &[f64],
        rng: &mut MixtureRng,
    ) -> f64;

    /// Number of free parameters, used by the criteria.
    fn free_parameter_count(&self) -> usize;

    /// Value used to fill a missing cell before any parameter exists,
    /// computed from the observed entries of its column.
    fn safe_value(&self, observed: &[f64]) -> f64 {
        if observed.is_empty() {
            return 0.0;
        }
        observed.iter().sum::<f64>() / observed.len() as f64
    }

    /// Snapshot of the current parameters.
    fn parameters(&self) -> ParameterSet;

    /// Replace the parameters. Must reject a set whose layout differs.
    fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()>;

    /// Clone into a new box.
    fn clone_box(&self) -> Box<dyn DensityModel>;
}

impl Clone for Box<dyn DensityModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
