//! Diagonal Gaussian family with four variance tying structures.

use super::special::{self, LN_SQRT_2PI};
use super::{
    check_block_width, check_cluster_weights, distinct_rows, draw_cluster, weighted_means,
};
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{
    DensityModel, MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
use rand_distr::{Distribution, Normal};

/// Variances at or below this are treated as degenerate.
const MIN_VARIANCE: f64 = 1e-12;

/// Which indices a variance is shared over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarianceTying {
    /// `[K, d]`
    ClusterVariable,
    /// `[K, 1]`
    Cluster,
    /// `[1, d]`
    Variable,
    /// `[1, 1]`
    Shared,
}

impl VarianceTying {
    fn shape(self, n_cluster: usize, n_var: usize) -> (usize, usize) {
        match self {
            Self::ClusterVariable => (n_cluster, n_var),
            Self::Cluster => (n_cluster, 1),
            Self::Variable => (1, n_var),
            Self::Shared => (1, 1),
        }
    }

    fn index(self, k: usize, j: usize, n_var: usize) -> usize {
        match self {
            Self::ClusterVariable => k * n_var + j,
            Self::Cluster => k,
            Self::Variable => j,
            Self::Shared => 0,
        }
    }
}

/// Gaussian with diagonal covariance.
///
/// Parameters: `mean` `[K, d]` and `sigma2`, whose shape follows the tying
/// (`[K, d]`, `[K, 1]`, `[1, d]` or `[1, 1]`).
#[derive(Debug, Clone)]
pub struct DiagonalGaussian {
    id: ModelId,
    tying: VarianceTying,
    n_cluster: usize,
    n_var: usize,
    mean: Vec<f64>,
    sigma2: Vec<f64>,
}

impl DiagonalGaussian {
    /// Gaussian model for `id` (one of the `Gaussian*` identifiers).
    pub fn new(id: ModelId, n_cluster: usize) -> MixtureResult<Self> {
        let tying = match id {
            ModelId::GaussianSjk => VarianceTying::ClusterVariable,
            ModelId::GaussianSk => VarianceTying::Cluster,
            ModelId::GaussianSj => VarianceTying::Variable,
            ModelId::GaussianS => VarianceTying::Shared,
            other => {
                return Err(MixtureError::UnknownModel {
                    name: format!("{other} is not a Gaussian model"),
                });
            }
        };
        Ok(Self {
            id,
            tying,
            n_cluster,
            n_var: 0,
            mean: Vec::new(),
            sigma2: Vec::new(),
        })
    }

    /// Mean of variable `j` in cluster `k`.
    pub fn mean(&self, k: usize, j: usize) -> f64 {
        self.mean[k * self.n_var + j]
    }

    /// Variance of variable `j` in cluster `k`.
    pub fn sigma2(&self, k: usize, j: usize) -> f64 {
        self.sigma2[self.tying.index(k, j, self.n_var)]
    }

    /// Variances from per-column variances (no cluster information yet).
    fn tie_column_variances(&self, column_var: &[f64]) -> Vec<f64> {
        let d = column_var.len();
        let pooled = column_var.iter().sum::<f64>() / d as f64;
        match self.tying {
            VarianceTying::ClusterVariable => {
                (0..self.n_cluster).flat_map(|_| column_var.iter().copied()).collect()
            }
            VarianceTying::Cluster => vec![pooled; self.n_cluster],
            VarianceTying::Variable => column_var.to_vec(),
            VarianceTying::Shared => vec![pooled],
        }
    }

    /// Pool weighted sums of squares `[K, d]` into the tied variances.
    fn tie_sums_of_squares(&self, ss: &[f64], nk: &[f64]) -> Vec<f64> {
        let (kk, d) = (self.n_cluster, self.n_var);
        let total: f64 = nk.iter().sum();
        match self.tying {
            VarianceTying::ClusterVariable => (0..kk * d).map(|idx| ss[idx] / nk[idx / d]).collect(),
            VarianceTying::Cluster => (0..kk)
                .map(|k| ss[k * d..(k + 1) * d].iter().sum::<f64>() / (d as f64 * nk[k]))
                .collect(),
            VarianceTying::Variable => (0..d)
                .map(|j| (0..kk).map(|k| ss[k * d + j]).sum::<f64>() / total)
                .collect(),
            VarianceTying::Shared => vec![ss.iter().sum::<f64>() / (d as f64 * total)],
        }
    }

    fn column_variances(&self, data: &DataBlock) -> MixtureResult<Vec<f64>> {
        (0..data.n_cols())
            .map(|j| {
                let column: Vec<f64> = (0..data.n_rows()).map(|i| data.value(i, j)).collect();
                let (_, var) = special::mean_var(&column);
                if var > MIN_VARIANCE {
                    Ok(var)
                } else {
                    Err(MixtureError::InitializeStepFail {
                        context: format!(
                            "{}: column {j} of block '{}' is constant",
                            self.id,
                            data.name()
                        ),
                    })
                }
            })
            .collect()
    }
}

impl DensityModel for DiagonalGaussian {
    fn id(&self) -> ModelId {
        self.id
    }

    fn n_cluster(&self) -> usize {
        self.n_cluster
    }

    fn layout(&self) -> ParameterLayout {
        let (rows, cols) = self.tying.shape(self.n_cluster, self.n_var);
        ParameterLayout::new([
            ("mean", self.n_cluster, self.n_var),
            ("sigma2", rows, cols),
        ])
    }

    fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()> {
        self.n_var = data.n_cols();
        let column_var = self.column_variances(data)?;
        let column_mean: Vec<f64> = (0..self.n_var)
            .map(|j| (0..data.n_rows()).map(|i| data.value(i, j)).sum::<f64>() / data.n_rows() as f64)
            .collect();
        self.mean = (0..self.n_cluster)
            .flat_map(|_| column_mean.iter().copied())
            .collect();
        self.sigma2 = self.tie_column_variances(&column_var);
        Ok(())
    }

    fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64 {
        let mut total = 0.0;
        for (j, &x) in data.row(i).iter().enumerate() {
            let s2 = self.sigma2(k, j);
            if !(s2 > MIN_VARIANCE && s2.is_finite()) {
                return f64::NAN;
            }
            let z = x - self.mean(k, j);
            total += -LN_SQRT_2PI - 0.5 * s2.ln() - 0.5 * z * z / s2;
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
        let column_var = self
            .column_variances(data)
            .map_err(|e| MixtureError::RandomInitFail {
                context: e.to_string(),
            })?;

        self.mean = seeds.iter().flat_map(|&r| data.row(r).iter().copied()).collect();
        self.sigma2 = self.tie_column_variances(&column_var);
        Ok(())
    }

    fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
        check_cluster_weights(self.id, nk)?;
        check_block_width(self.id, self.n_var, data)
            .map_err(|e| MixtureError::MStepFail { context: e.to_string() })?;

        let (kk, d) = (self.n_cluster, self.n_var);
        let mean = weighted_means(data, tik, nk);

        let mut ss = vec![0.0; kk * d];
        for i in 0..data.n_rows() {
            let row = data.row(i);
            for k in 0..kk {
                let t = tik[i * kk + k];
                if t == 0.0 {
                    continue;
                }
                for (j, &x) in row.iter().enumerate() {
                    let z = x - mean[k * d + j];
                    ss[k * d + j] += t * z * z;
                }
            }
        }
        let sigma2 = self.tie_sums_of_squares(&ss, nk);

        if let Some(bad) = mean.iter().position(|m| !m.is_finite()) {
            return Err(MixtureError::MStepFail {
                context: format!("{}: non-finite mean at {bad}", self.id),
            });
        }
        if let Some(bad) = sigma2.iter().position(|&s| !(s > MIN_VARIANCE && s.is_finite())) {
            return Err(MixtureError::MStepFail {
                context: format!("{}: degenerate variance {} at {bad}", self.id, sigma2[bad]),
            });
        }

        self.mean = mean;
        self.sigma2 = sigma2;
        Ok(())
    }

    fn impute(&self, _data: &DataBlock, _i: usize, j: usize, weights: &[f64]) -> f64 {
        let total: f64 = weights.iter().sum();
        weights
            .iter()
            .enumerate()
            .map(|(k, w)| w * self.mean(k, j))
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
        match Normal::new(self.mean(k, j), self.sigma2(k, j).sqrt()) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.mean(k, j),
        }
    }

    fn free_parameter_count(&self) -> usize {
        let (rows, cols) = self.tying.shape(self.n_cluster, self.n_var);
        self.n_cluster * self.n_var + rows * cols
    }

    fn parameters(&self) -> ParameterSet {
        let (rows, cols) = self.tying.shape(self.n_cluster, self.n_var);
        ParameterSet::new(vec![
            ParameterArray {
                name: "mean".to_string(),
                rows: self.n_cluster,
                cols: self.n_var,
                values: self.mean.clone(),
            },
            ParameterArray {
                name: "sigma2".to_string(),
                rows,
                cols,
                values: self.sigma2.clone(),
            },
        ])
    }

    fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        params.check_layout(&self.layout(), self.id.name())?;
        let mean = &params.require("mean")?.values;
        let sigma2 = &params.require("sigma2")?.values;
        if mean.iter().any(|m| !m.is_finite()) {
            return Err(MixtureError::InvalidParameter {
                parameter: "mean".to_string(),
                message: "must be finite".to_string(),
            });
        }
        if sigma2.iter().any(|&s| !(s > MIN_VARIANCE && s.is_finite())) {
            return Err(MixtureError::InvalidParameter {
                parameter: "sigma2".to_string(),
                message: "must be positive and finite".to_string(),
            });
        }
        self.mean = mean.clone();
        self.sigma2 = sigma2.clone();
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
        DataBlock::new(
            "g",
            4,
            2,
            vec![0.0, 1.0, 0.2, 1.2, 10.0, -1.0, 10.2, -1.2],
        )
        .unwrap()
    }

    fn hard_tik() -> (Vec<f64>, Vec<f64>) {
        (
            vec![1.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 1.0],
            vec![2.0, 2.0],
        )
    }

    #[test]
    fn test_layout_per_tying() {
        let data = block();
        for (id, shape, free) in [
            (ModelId::GaussianSjk, (2, 2), 8),
            (ModelId::GaussianSk, (2, 1), 6),
            (ModelId::GaussianSj, (1, 2), 6),
            (ModelId::GaussianS, (1, 1), 5),
        ] {
            let mut m = DiagonalGaussian::new(id, 2).unwrap();
            m.initialize(&data).unwrap();
            let layout = m.layout();
            let sigma = &layout.shapes()[1];
            assert_eq!((sigma.rows, sigma.cols), shape, "{id}");
            assert_eq!(m.free_parameter_count(), free, "{id}");
        }
        assert!(DiagonalGaussian::new(ModelId::PoissonLk, 2).is_err());
    }

    #[test]
    fn test_m_step_hard_assignment() {
        let data = block();
        let (tik, nk) = hard_tik();
        let mut m = DiagonalGaussian::new(ModelId::GaussianSjk, 2).unwrap();
        m.initialize(&data).unwrap();
        m.run(&data, &tik, &nk).unwrap();

        assert!((m.mean(0, 0) - 0.1).abs() < 1e-12);
        assert!((m.mean(1, 1) + 1.1).abs() < 1e-12);
        assert!((m.sigma2(0, 0) - 0.01).abs() < 1e-12);

        // Closer cluster wins.
        assert!(m.log_density(&data, 0, 0) > m.log_density(&data, 0, 1));
    }

    #[test]
    fn test_tied_variances_pool_sums_of_squares() {
        // Cluster 0 sums of squares (0.02, 0.02), cluster 1 (0.5, 2.0).
        let data = DataBlock::new(
            "g",
            4,
            2,
            vec![0.0, 1.0, 0.2, 1.2, 10.0, -1.0, 11.0, -3.0],
        )
        .unwrap();
        let (tik, nk) = hard_tik();
        let fitted = |id| {
            let mut m = DiagonalGaussian::new(id, 2).unwrap();
            m.initialize(&data).unwrap();
            m.run(&data, &tik, &nk).unwrap();
            m.sigma2
        };
        let close = |got: Vec<f64>, want: &[f64]| {
            assert_eq!(got.len(), want.len());
            for (g, w) in got.iter().zip(want) {
                assert!((g - w).abs() < 1e-12, "got {got:?}, want {want:?}");
            }
        };

        close(fitted(ModelId::GaussianSjk), &[0.01, 0.01, 0.25, 1.0]);
        close(fitted(ModelId::GaussianSk), &[0.01, 0.625]);
        close(fitted(ModelId::GaussianSj), &[0.13, 0.505]);
        close(fitted(ModelId::GaussianS), &[0.3175]);
    }

    #[test]
    fn test_failed_m_step_keeps_parameters() {
        let data = block();
        let mut m = DiagonalGaussian::new(ModelId::GaussianSk, 2).unwrap();
        m.initialize(&data).unwrap();
        let before = m.parameters();

        let tik = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let err = m.run(&data, &tik, &[4.0, 0.0]).unwrap_err();
        assert!(matches!(err, MixtureError::MStepFail { .. }));
        assert_eq!(m.parameters(), before);
    }

    #[test]
    fn test_degenerate_variance_is_nan() {
        let data = block();
        let mut m = DiagonalGaussian::new(ModelId::GaussianS, 2).unwrap();
        m.initialize(&data).unwrap();
        m.sigma2 = vec![0.0];
        assert!(m.log_density(&data, 0, 0).is_nan());
    }

    #[test]
    fn test_constant_column_fails_initialize() {
        let data = DataBlock::new("c", 3, 1, vec![2.0, 2.0, 2.0]).unwrap();
        let mut m = DiagonalGaussian::new(ModelId::GaussianSjk, 2).unwrap();
        assert!(matches!(
            m.initialize(&data),
            Err(MixtureError::InitializeStepFail { .. })
        ));
    }

    #[test]
    fn test_impute_weighted_mean() {
        let data = block();
        let (tik, nk) = hard_tik();
        let mut m = DiagonalGaussian::new(ModelId::GaussianSjk, 2).unwrap();
        m.initialize(&data).unwrap();
        m.run(&data, &tik, &nk).unwrap();
        let v = m.impute(&data, 0, 0, &[0.5, 0.5]);
        assert!((v - 5.1).abs() < 1e-12);
    }
}
