//! Gamma family for positive continuous variables.

use super::special::{self, gamma_shape_from_log_gap};
use super::{check_block_width, check_cluster_weights, distinct_rows, draw_cluster};
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{
    DensityModel, MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
use rand_distr::{Distribution, Gamma};

/// Gamma density with shape `a` and scale `b`:
/// `ln f(x) = (a - 1) ln x - x / b - lnΓ(a) - a ln b`.
///
/// `GammaAjkBjk` keeps both parameters per cluster and variable
/// (`[K, d]`); `GammaAkBk` shares them across variables (`[K, 1]`).
#[derive(Debug, Clone)]
pub struct GammaModel {
    id: ModelId,
    per_variable: bool,
    n_cluster: usize,
    n_var: usize,
    shape: Vec<f64>,
    scale: Vec<f64>,
}

impl GammaModel {
    /// Gamma model for `id` (`GammaAjkBjk` or `GammaAkBk`).
    pub fn new(id: ModelId, n_cluster: usize) -> MixtureResult<Self> {
        let per_variable = match id {
            ModelId::GammaAjkBjk => true,
            ModelId::GammaAkBk => false,
            other => {
                return Err(MixtureError::UnknownModel {
                    name: format!("{other} is not a gamma model"),
                });
            }
        };
        Ok(Self {
            id,
            per_variable,
            n_cluster,
            n_var: 0,
            shape: Vec::new(),
            scale: Vec::new(),
        })
    }

    fn cols(&self) -> usize {
        if self.per_variable {
            self.n_var
        } else {
            1
        }
    }

    #[inline]
    fn index(&self, k: usize, j: usize) -> usize {
        if self.per_variable {
            k * self.n_var + j
        } else {
            k
        }
    }

    /// Shape of variable `j` in cluster `k`.
    pub fn shape(&self, k: usize, j: usize) -> f64 {
        self.shape[self.index(k, j)]
    }

    /// Scale of variable `j` in cluster `k`.
    pub fn scale(&self, k: usize, j: usize) -> f64 {
        self.scale[self.index(k, j)]
    }

    /// Method-of-moments shape and scale from a mean and variance.
    fn moments(mean: f64, var: f64) -> Option<(f64, f64)> {
        if !(mean > 0.0 && var > 0.0 && mean.is_finite() && var.is_finite()) {
            return None;
        }
        Some((mean * mean / var, var / mean))
    }

    /// Per-column moment estimates, pooled over columns for `AkBk`.
    fn column_moments(&self, data: &DataBlock) -> Option<Vec<(f64, f64)>> {
        let per_column: Vec<(f64, f64)> = (0..data.n_cols())
            .map(|j| {
                let column: Vec<f64> = (0..data.n_rows()).map(|i| data.value(i, j)).collect();
                special::mean_var(&column)
            })
            .collect();
        if self.per_variable {
            per_column
                .into_iter()
                .map(|(m, v)| Self::moments(m, v))
                .collect()
        } else {
            let d = per_column.len() as f64;
            let m = per_column.iter().map(|p| p.0).sum::<f64>() / d;
            let v = per_column.iter().map(|p| p.1).sum::<f64>() / d;
            Self::moments(m, v).map(|p| vec![p])
        }
    }

    fn check_positive(&self, data: &DataBlock) -> MixtureResult<()> {
        match data.values().iter().position(|&x| !(x > 0.0)) {
            Some(idx) => Err(MixtureError::InitializeStepFail {
                context: format!(
                    "{}: block '{}' has non-positive value at ({}, {})",
                    self.id,
                    data.name(),
                    idx / data.n_cols(),
                    idx % data.n_cols()
                ),
            }),
            None => Ok(()),
        }
    }
}

impl DensityModel for GammaModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn n_cluster(&self) -> usize {
        self.n_cluster
    }

    fn layout(&self) -> ParameterLayout {
        let cols = self.cols();
        ParameterLayout::new([
            ("shape", self.n_cluster, cols),
            ("scale", self.n_cluster, cols),
        ])
    }

    fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()> {
        self.check_positive(data)?;
        self.n_var = data.n_cols();
        let moments = self
            .column_moments(data)
            .ok_or_else(|| MixtureError::InitializeStepFail {
                context: format!("{}: block '{}' has a constant column", self.id, data.name()),
            })?;
        self.shape = (0..self.n_cluster)
            .flat_map(|_| moments.iter().map(|m| m.0))
            .collect();
        self.scale = (0..self.n_cluster)
            .flat_map(|_| moments.iter().map(|m| m.1))
            .collect();
        Ok(())
    }

    fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64 {
        let mut total = 0.0;
        for (j, &x) in data.row(i).iter().enumerate() {
            let (a, b) = (self.shape(k, j), self.scale(k, j));
            if !(a > 0.0 && b > 0.0 && a.is_finite() && b.is_finite()) {
                return f64::NAN;
            }
            if x <= 0.0 {
                return f64::NEG_INFINITY;
            }
            total += (a - 1.0) * x.ln() - x / b - special::lgamma(a) - a * b.ln();
        }
        total
    }

    fn random_init(
        &mut self,
        data: &DataBlock,
        _tik: &[f64],
        _nk: &[f64],
        rng: &mut MixtureRng,
    ) -> MixtureResult<()> {
        check_block_width(self.id, self.n_var, data)?;
        let seeds = distinct_rows(self.id, data.n_rows(), self.n_cluster, rng)?;
        let moments = self
            .column_moments(data)
            .ok_or_else(|| MixtureError::RandomInitFail {
                context: format!("{}: block '{}' has a constant column", self.id, data.name()),
            })?;

        // Keep each column's shape; move the mean onto a random sample.
        let cols = self.cols();
        let mut shape = Vec::with_capacity(self.n_cluster * cols);
        let mut scale = Vec::with_capacity(self.n_cluster * cols);
        for &r in &seeds {
            let row = data.row(r);
            for (c, &(a, _)) in moments.iter().enumerate() {
                let target = if self.per_variable {
                    row[c]
                } else {
                    row.iter().sum::<f64>() / row.len() as f64
                };
                shape.push(a);
                scale.push(target / a);
            }
        }
        self.shape = shape;
        self.scale = scale;
        Ok(())
    }

    fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
        check_cluster_weights(self.id, nk)?;
        check_block_width(self.id, self.n_var, data)
            .map_err(|e| MixtureError::MStepFail { context: e.to_string() })?;

        let (kk, d) = (self.n_cluster, self.n_var);
        // Weighted sums of x and ln x, [K, d].
        let mut sum_x = vec![0.0; kk * d];
        let mut sum_log = vec![0.0; kk * d];
        for i in 0..data.n_rows() {
            let row = data.row(i);
            for k in 0..kk {
                let t = tik[i * kk + k];
                if t == 0.0 {
                    continue;
                }
                for (j, &x) in row.iter().enumerate() {
                    sum_x[k * d + j] += t * x;
                    sum_log[k * d + j] += t * x.ln();
                }
            }
        }

        let cols = self.cols();
        let mut shape = Vec::with_capacity(kk * cols);
        let mut scale = Vec::with_capacity(kk * cols);
        for k in 0..kk {
            let w = nk[k];
            let stats: Vec<(f64, f64)> = if self.per_variable {
                (0..d)
                    .map(|j| (sum_x[k * d + j] / w, sum_log[k * d + j] / w))
                    .collect()
            } else {
                let m = sum_x[k * d..(k + 1) * d].iter().sum::<f64>() / (w * d as f64);
                let l = sum_log[k * d..(k + 1) * d].iter().sum::<f64>() / (w * d as f64);
                vec![(m, l)]
            };
            for (c, (mean, mean_log)) in stats.into_iter().enumerate() {
                let a = gamma_shape_from_log_gap(mean.ln() - mean_log).ok_or_else(|| {
                    MixtureError::MStepFail {
                        context: format!(
                            "{}: no shape estimate for cluster {k}, column {c} (mean {mean})",
                            self.id
                        ),
                    }
                })?;
                let b = mean / a;
                if !(b > 0.0 && b.is_finite()) {
                    return Err(MixtureError::MStepFail {
                        context: format!("{}: degenerate scale {b} in cluster {k}", self.id),
                    });
                }
                shape.push(a);
                scale.push(b);
            }
        }

        self.shape = shape;
        self.scale = scale;
        Ok(())
    }

    fn impute(&self, _data: &DataBlock, _i: usize, j: usize, weights: &[f64]) -> f64 {
        let total: f64 = weights.iter().sum();
        weights
            .iter()
            .enumerate()
            .map(|(k, w)| w * self.shape(k, j) * self.scale(k, j))
            .sum::<f64>()
            / total
    }

    fn sample(
        &self,
        data: &DataBlock,
        i: usize,
        j: usize,
        weights: &[f64],
        rng: &mut MixtureRng,
    ) -> f64 {
        let Some(k) = draw_cluster(weights, rng) else {
            return self.impute(data, i, j, weights);
        };
        match Gamma::new(self.shape(k, j), self.scale(k, j)) {
            // A draw can underflow to zero for tiny shapes.
            Ok(dist) => dist.sample(rng).max(f64::MIN_POSITIVE),
            Err(_) => self.shape(k, j) * self.scale(k, j),
        }
    }

    fn free_parameter_count(&self) -> usize {
        2 * self.n_cluster * self.cols()
    }

    fn parameters(&self) -> ParameterSet {
        let cols = self.cols();
        ParameterSet::new(vec![
            ParameterArray {
                name: "shape".to_string(),
                rows: self.n_cluster,
                cols,
                values: self.shape.clone(),
            },
            ParameterArray {
                name: "scale".to_string(),
                rows: self.n_cluster,
                cols,
                values: self.scale.clone(),
            },
        ])
    }

    fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        params.check_layout(&self.layout(), self.id.name())?;
        let shape = &params.require("shape")?.values;
        let scale = &params.require("scale")?.values;
        for (name, values) in [("shape", shape), ("scale", scale)] {
            if values.iter().any(|&v| !(v > 0.0 && v.is_finite())) {
                return Err(MixtureError::InvalidParameter {
                    parameter: name.to_string(),
                    message: "must be positive and finite".to_string(),
                });
            }
        }
        self.shape = shape.clone();
        self.scale = scale.clone();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DensityModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> DataBlock {
        DataBlock::new("g", 6, 1, vec![1.0, 1.5, 2.0, 8.0, 10.0, 12.0]).unwrap()
    }

    #[test]
    fn test_initialize_by_moments() {
        let data = block();
        let mut m = GammaModel::new(ModelId::GammaAjkBjk, 2).unwrap();
        m.initialize(&data).unwrap();
        let mean = m.shape(0, 0) * m.scale(0, 0);
        assert!((mean - 34.5 / 6.0).abs() < 1e-10);
        assert_eq!(m.free_parameter_count(), 4);
    }

    #[test]
    fn test_rejects_non_positive() {
        let data = DataBlock::new("g", 3, 1, vec![1.0, 0.0, 2.0]).unwrap();
        let mut m = GammaModel::new(ModelId::GammaAkBk, 2).unwrap();
        assert!(matches!(
            m.initialize(&data),
            Err(MixtureError::InitializeStepFail { .. })
        ));
    }

    #[test]
    fn test_m_step_matches_cluster_means() {
        let data = block();
        let tik = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let nk = vec![3.0, 3.0];
        let mut m = GammaModel::new(ModelId::GammaAjkBjk, 2).unwrap();
        m.initialize(&data).unwrap();
        m.run(&data, &tik, &nk).unwrap();

        // MLE preserves the weighted mean: a * b = mean.
        assert!((m.shape(0, 0) * m.scale(0, 0) - 1.5).abs() < 1e-8);
        assert!((m.shape(1, 0) * m.scale(1, 0) - 10.0).abs() < 1e-8);
        assert!(m.log_density(&data, 0, 0) > m.log_density(&data, 0, 1));
        assert!(m.log_density(&data, 5, 1) > m.log_density(&data, 5, 0));
    }

    #[test]
    fn test_shared_parameters_pool_columns() {
        // Cluster 0 pools {1, 2, 2, 3}, cluster 1 pools {8, 12, 9, 11}.
        let data = DataBlock::new("g", 4, 2, vec![1.0, 2.0, 2.0, 3.0, 8.0, 12.0, 9.0, 11.0])
            .unwrap();
        let tik = vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0];
        let mut shared = GammaModel::new(ModelId::GammaAkBk, 2).unwrap();
        shared.initialize(&data).unwrap();
        shared.run(&data, &tik, &[2.0, 2.0]).unwrap();

        // Same values stacked in one column, fitted per variable.
        let stacked =
            DataBlock::new("s", 8, 1, vec![1.0, 2.0, 2.0, 3.0, 8.0, 12.0, 9.0, 11.0]).unwrap();
        let stacked_tik: Vec<f64> = (0..8)
            .flat_map(|i| if i < 4 { [1.0, 0.0] } else { [0.0, 1.0] })
            .collect();
        let mut single = GammaModel::new(ModelId::GammaAjkBjk, 2).unwrap();
        single.initialize(&stacked).unwrap();
        single.run(&stacked, &stacked_tik, &[4.0, 4.0]).unwrap();

        for (k, mean) in [(0, 2.0), (1, 10.0)] {
            let (a, b) = (shared.shape(k, 0), shared.scale(k, 0));
            assert_eq!(shared.shape(k, 1), a);
            assert!((a * b - mean).abs() < 1e-8, "cluster {k}: a*b = {}", a * b);
            assert!((a - single.shape(k, 0)).abs() < 1e-8);
            assert!((b - single.scale(k, 0)).abs() < 1e-8);
        }
        let gap = 2.0_f64.ln() - 12.0_f64.ln() / 4.0;
        let a = shared.shape(0, 0);
        assert!((a.ln() - special::digamma(a) - gap).abs() < 1e-6);
    }

    #[test]
    fn test_shared_parameters_layout() {
        let data = DataBlock::new("g", 3, 2, vec![1.0, 2.0, 2.0, 3.0, 4.0, 1.0]).unwrap();
        let mut m = GammaModel::new(ModelId::GammaAkBk, 3).unwrap();
        m.initialize(&data).unwrap();
        let layout = m.layout();
        assert_eq!(layout.shapes()[0].cols, 1);
        assert_eq!(m.free_parameter_count(), 6);
        assert_eq!(m.shape(2, 1), m.shape(2, 0));
    }

    #[test]
    fn test_non_positive_observation_is_impossible() {
        let data = block();
        let mut m = GammaModel::new(ModelId::GammaAjkBjk, 1).unwrap();
        m.initialize(&data).unwrap();
        let zero = DataBlock::new("z", 1, 1, vec![-1.0]).unwrap();
        assert_eq!(m.log_density(&zero, 0, 0), f64::NEG_INFINITY);
    }
}
