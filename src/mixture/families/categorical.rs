//! Categorical family for integer-coded qualitative variables.

use super::special::argmax;
use super::{check_block_width, check_cluster_weights, draw_cluster};
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{
    DensityModel, MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
use rand::Rng;

/// Floor applied to estimated probabilities so that an unseen modality does
/// not zero out a whole cluster.
const MIN_PROBA: f64 = 1e-10;

/// Categorical model with one probability table per cluster and variable.
///
/// Variable `j` takes the modalities `0..m_j`; `m_j` is inferred from the
/// data at initialization. Parameters are stored as `proba` `[K, Σ m_j]`,
/// variable `j` occupying columns `offset_j..offset_j + m_j`.
#[derive(Debug, Clone)]
pub struct Categorical {
    n_cluster: usize,
    modalities: Vec<usize>,
    offsets: Vec<usize>,
    proba: Vec<f64>,
}

impl Categorical {
    /// Categorical model for `n_cluster` clusters.
    pub fn new(n_cluster: usize) -> Self {
        Self {
            n_cluster,
            modalities: Vec::new(),
            offsets: Vec::new(),
            proba: Vec::new(),
        }
    }

    fn width(&self) -> usize {
        self.modalities.iter().sum()
    }

    /// Number of modalities of each variable.
    pub fn modalities(&self) -> &[usize] {
        &self.modalities
    }

    /// Probability of modality `l` of variable `j` in cluster `k`.
    pub fn proba(&self, k: usize, j: usize, l: usize) -> f64 {
        self.proba[k * self.width() + self.offsets[j] + l]
    }

    fn counts(&self, data: &DataBlock, tik: Option<&[f64]>) -> Vec<f64> {
        let (kk, w) = (self.n_cluster, self.width());
        let mut counts = vec![0.0; kk * w];
        for i in 0..data.n_rows() {
            for (j, &x) in data.row(i).iter().enumerate() {
                let col = self.offsets[j] + x as usize;
                for k in 0..kk {
                    counts[k * w + col] += tik.map_or(1.0, |t| t[i * kk + k]);
                }
            }
        }
        counts
    }

    /// Normalize each (cluster, variable) segment of `table` in place.
    fn normalize(&self, table: &mut [f64]) -> bool {
        let w = self.width();
        for k in 0..self.n_cluster {
            for (j, &m) in self.modalities.iter().enumerate() {
                let start = k * w + self.offsets[j];
                let segment = &mut table[start..start + m];
                segment.iter_mut().for_each(|p| *p = p.max(MIN_PROBA));
                let total: f64 = segment.iter().sum();
                if !(total > 0.0 && total.is_finite()) {
                    return false;
                }
                segment.iter_mut().for_each(|p| *p /= total);
            }
        }
        true
    }

    /// Cluster mixture of the modality probabilities of variable `j`.
    fn mixed(&self, j: usize, weights: &[f64]) -> Vec<f64> {
        (0..self.modalities[j])
            .map(|l| {
                weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * self.proba(k, j, l))
                    .sum()
            })
            .collect()
    }
}

impl DensityModel for Categorical {
    fn id(&self) -> ModelId {
        ModelId::CategoricalPjk
    }

    fn n_cluster(&self) -> usize {
        self.n_cluster
    }

    fn layout(&self) -> ParameterLayout {
        ParameterLayout::new([("proba", self.n_cluster, self.width())])
    }

    fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()> {
        if let Some(idx) = data
            .values()
            .iter()
            .position(|&x| x < 0.0 || x.fract() != 0.0)
        {
            return Err(MixtureError::InitializeStepFail {
                context: format!(
                    "categorical_pjk: block '{}' has a non-modality value {}",
                    data.name(),
                    data.values()[idx]
                ),
            });
        }
        self.modalities = (0..data.n_cols())
            .map(|j| {
                (0..data.n_rows())
                    .map(|i| data.value(i, j) as usize)
                    .max()
                    .map_or(1, |m| m + 1)
            })
            .collect();
        self.offsets = self
            .modalities
            .iter()
            .scan(0, |acc, &m| {
                let start = *acc;
                *acc += m;
                Some(start)
            })
            .collect();

        let mut table = self.counts(data, None);
        if !self.normalize(&mut table) {
            return Err(MixtureError::InitializeStepFail {
                context: format!("categorical_pjk: block '{}' has no counts", data.name()),
            });
        }
        self.proba = table;
        Ok(())
    }

    fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64 {
        let mut total = 0.0;
        for (j, &x) in data.row(i).iter().enumerate() {
            let l = x as usize;
            if l >= self.modalities[j] {
                return f64::NEG_INFINITY;
            }
            let p = self.proba(k, j, l);
            if !(p >= 0.0 && p.is_finite()) {
                return f64::NAN;
            }
            total += p.ln();
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
        check_block_width(ModelId::CategoricalPjk, self.modalities.len(), data)?;
        // Half empirical frequency, half uniform noise, per cluster.
        let empirical = {
            let mut t = self.counts(data, None);
            self.normalize(&mut t);
            t
        };
        let mut table: Vec<f64> = empirical
            .iter()
            .map(|&p| 0.5 * p + 0.5 * rng.gen::<f64>())
            .collect();
        if !self.normalize(&mut table) {
            return Err(MixtureError::RandomInitFail {
                context: "categorical_pjk: degenerate random table".to_string(),
            });
        }
        self.proba = table;
        Ok(())
    }

    fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
        check_cluster_weights(ModelId::CategoricalPjk, nk)?;
        check_block_width(ModelId::CategoricalPjk, self.modalities.len(), data)
            .map_err(|e| MixtureError::MStepFail { context: e.to_string() })?;
        let n_cols = data.n_cols();
        if let Some((_, x)) = data
            .values()
            .iter()
            .enumerate()
            .find(|&(idx, &x)| x < 0.0 || x as usize >= self.modalities[idx % n_cols])
        {
            return Err(MixtureError::MStepFail {
                context: format!("categorical_pjk: modality {x} out of range"),
            });
        }

        let mut table = self.counts(data, Some(tik));
        if !self.normalize(&mut table) {
            return Err(MixtureError::MStepFail {
                context: "categorical_pjk: empty probability segment".to_string(),
            });
        }
        self.proba = table;
        Ok(())
    }

    fn impute(&self, _data: &DataBlock, _i: usize, j: usize, weights: &[f64]) -> f64 {
        argmax(&self.mixed(j, weights)).unwrap_or(0) as f64
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
        let probs: Vec<f64> = (0..self.modalities[j]).map(|l| self.proba(k, j, l)).collect();
        match draw_cluster(&probs, rng) {
            Some(l) => l as f64,
            None => self.impute(data, i, j, weights),
        }
    }

    fn free_parameter_count(&self) -> usize {
        self.n_cluster * self.modalities.iter().map(|m| m - 1).sum::<usize>()
    }

    /// Column mode, lowest modality on ties.
    fn safe_value(&self, observed: &[f64]) -> f64 {
        let max = observed
            .iter()
            .filter(|x| **x >= 0.0)
            .map(|&x| x as usize)
            .max()
            .unwrap_or(0);
        let mut counts = vec![0.0; max + 1];
        for &x in observed.iter().filter(|x| **x >= 0.0) {
            counts[x as usize] += 1.0;
        }
        argmax(&counts).unwrap_or(0) as f64
    }

    fn parameters(&self) -> ParameterSet {
        ParameterSet::new(vec![ParameterArray {
            name: "proba".to_string(),
            rows: self.n_cluster,
            cols: self.width(),
            values: self.proba.clone(),
        }])
    }

    fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        params.check_layout(&self.layout(), "categorical_pjk")?;
        let proba = &params.require("proba")?.values;
        let w = self.width();
        for k in 0..self.n_cluster {
            for (j, &m) in self.modalities.iter().enumerate() {
                let start = k * w + self.offsets[j];
                let segment = &proba[start..start + m];
                let total: f64 = segment.iter().sum();
                if segment.iter().any(|&p| !(p >= 0.0)) || (total - 1.0).abs() > 1e-6 {
                    return Err(MixtureError::InvalidParameter {
                        parameter: "proba".to_string(),
                        message: format!(
                            "cluster {k}, variable {j}: probabilities must be non-negative and sum to 1"
                        ),
                    });
                }
            }
        }
        self.proba = proba.clone();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DensityModel> {
        Box::new(self.clone())
    }
}
