//! Poisson family for count variables.

use super::special;
use super::{check_block_width, check_cluster_weights, distinct_rows, draw_cluster, weighted_means};
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{
    DensityModel, MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
use rand_distr::{Distribution, Poisson};

/// Poisson with intensity `lambda`: `ln f(x) = x ln λ - λ - lnΓ(x + 1)`.
///
/// `PoissonLjk` has one intensity per cluster and variable (`[K, d]`),
/// `PoissonLk` one per cluster (`[K, 1]`).
#[derive(Debug, Clone)]
pub struct PoissonModel {
    id: ModelId,
    per_variable: bool,
    n_cluster: usize,
    n_var: usize,
    lambda: Vec<f64>,
}

impl PoissonModel {
    /// Poisson model for `id` (`PoissonLjk` or `PoissonLk`).
    pub fn new(id: ModelId, n_cluster: usize) -> MixtureResult<Self> {
        let per_variable = match id {
            ModelId::PoissonLjk => true,
            ModelId::PoissonLk => false,
            other => {
                return Err(MixtureError::UnknownModel {
                    name: format!("{other} is not a Poisson model"),
                });
            }
        };
        Ok(Self {
            id,
            per_variable,
            n_cluster,
            n_var: 0,
            lambda: Vec::new(),
        })
    }

    fn cols(&self) -> usize {
        if self.per_variable {
            self.n_var
        } else {
            1
        }
    }

    /// Intensity of variable `j` in cluster `k`.
    pub fn lambda(&self, k: usize, j: usize) -> f64 {
        if self.per_variable {
            self.lambda[k * self.n_var + j]
        } else {
            self.lambda[k]
        }
    }

    fn pool(&self, means: &[f64]) -> Vec<f64> {
        if self.per_variable {
            return means.to_vec();
        }
        means
            .chunks(self.n_var)
            .map(|row| row.iter().sum::<f64>() / row.len() as f64)
            .collect()
    }
}

impl DensityModel for PoissonModel {
    fn id(&self) -> ModelId {
        self.id
    }

    fn n_cluster(&self) -> usize {
        self.n_cluster
    }

    fn layout(&self) -> ParameterLayout {
        ParameterLayout::new([("lambda", self.n_cluster, self.cols())])
    }

    fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()> {
        if let Some(idx) = data
            .values()
            .iter()
            .position(|&x| x < 0.0 || x.fract() != 0.0)
        {
            return Err(MixtureError::InitializeStepFail {
                context: format!(
                    "{}: block '{}' has a non-count value {}",
                    self.id,
                    data.name(),
                    data.values()[idx]
                ),
            });
        }
        self.n_var = data.n_cols();
        let column_mean: Vec<f64> = (0..self.n_var)
            .map(|j| {
                (0..data.n_rows()).map(|i| data.value(i, j)).sum::<f64>() / data.n_rows() as f64
            })
            .collect();
        if let Some(j) = column_mean.iter().position(|&m| m <= 0.0) {
            return Err(MixtureError::InitializeStepFail {
                context: format!("{}: column {j} of block '{}' is all zero", self.id, data.name()),
            });
        }
        let means: Vec<f64> = (0..self.n_cluster)
            .flat_map(|_| column_mean.iter().copied())
            .collect();
        self.lambda = self.pool(&means);
        Ok(())
    }

    fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64 {
        let mut total = 0.0;
        for (j, &x) in data.row(i).iter().enumerate() {
            let l = self.lambda(k, j);
            if !(l > 0.0 && l.is_finite()) {
                return f64::NAN;
            }
            total += x * l.ln() - l - special::lgamma(x + 1.0);
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
        let d = self.n_var;
        let column_mean: Vec<f64> = (0..d)
            .map(|j| {
                (0..data.n_rows()).map(|i| data.value(i, j)).sum::<f64>() / data.n_rows() as f64
            })
            .collect();
        // Zero counts in the seed row would give a zero intensity.
        let means: Vec<f64> = seeds
            .iter()
            .flat_map(|&r| data.row(r).iter().copied())
            .enumerate()
            .map(|(idx, x)| x.max(0.5 * column_mean[idx % d]))
            .collect();
        self.lambda = self.pool(&means);
        Ok(())
    }

    fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
        check_cluster_weights(self.id, nk)?;
        check_block_width(self.id, self.n_var, data)
            .map_err(|e| MixtureError::MStepFail { context: e.to_string() })?;

        let lambda = self.pool(&weighted_means(data, tik, nk));
        if let Some(bad) = lambda.iter().position(|&l| !(l > 0.0 && l.is_finite())) {
            return Err(MixtureError::MStepFail {
                context: format!("{}: degenerate intensity {} at {bad}", self.id, lambda[bad]),
            });
        }
        self.lambda = lambda;
        Ok(())
    }

    fn impute(&self, _data: &DataBlock, _i: usize, j: usize, weights: &[f64]) -> f64 {
        let total: f64 = weights.iter().sum();
        let expected = weights
            .iter()
            .enumerate()
            .map(|(k, w)| w * self.lambda(k, j))
            .sum::<f64>()
            / total;
        expected.round()
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
        match Poisson::new(self.lambda(k, j)) {
            Ok(dist) => dist.sample(rng),
            Err(_) => self.lambda(k, j).round(),
        }
    }

    fn free_parameter_count(&self) -> usize {
        self.n_cluster * self.cols()
    }

    fn safe_value(&self, observed: &[f64]) -> f64 {
        if observed.is_empty() {
            return 0.0;
        }
        (observed.iter().sum::<f64>() / observed.len() as f64).round()
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![ParameterArray {
            name: "lambda".to_string(),
            rows: self.n_cluster,
            cols: self.cols(),
            values: self.lambda.clone(),
        }])
    }

    fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        params.check_layout(&self.layout(), self.id.name())?;
        let lambda = &params.require("lambda")?.values;
        if lambda.iter().any(|&l| !(l > 0.0 && l.is_finite())) {
            return Err(MixtureError::InvalidParameter {
                parameter: "lambda".to_string(),
                message: "must be positive and finite".to_string(),
            });
        }
        self.lambda = lambda.clone();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DensityModel> {
        Box::new(self.clone())
    }
}
