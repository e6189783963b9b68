//! Block bridge: one density model bound to one owned data block.

use super::accumulator::ParameterAccumulator;
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{DensityModel, MixtureRng, ModelId, ParameterSet};

/// Adapter between a [`DensityModel`] and the composer.
///
/// The bridge owns its data copy. Missing cells are filled with the model's
/// safe value at construction and then only ever rewritten by
/// [`Bridge::imputation_step`] or [`Bridge::sampling_step`].
#[derive(Debug, Clone)]
pub struct Bridge {
    model: Box<dyn DensityModel>,
    data: DataBlock,
    accumulator: ParameterAccumulator,
}

impl Bridge {
    /// Bind `model` to `data`, filling missing cells with safe values.
    pub fn new(model: Box<dyn DensityModel>, mut data: DataBlock) -> Self {
        for j in 0..data.n_cols() {
            let observed = data.observed_column(j);
            if observed.len() == data.n_rows() {
                continue;
            }
            let fill = model.safe_value(&observed);
            let rows: Vec<usize> = data
                .missing()
                .iter()
                .filter(|&&(_, c)| c == j)
                .map(|&(i, _)| i)
                .collect();
            for i in rows {
                data.set_missing_value(i, j, fill);
            }
        }
        let accumulator = ParameterAccumulator::new(model.layout());
        Self {
            model,
            data,
            accumulator,
        }
    }

    /// Block name.
    pub fn name(&self) -> &str {
        self.data.name()
    }

    /// Family of the bound model.
    pub fn model_id(&self) -> ModelId {
        self.model.id()
    }

    /// Bound density model.
    pub fn model(&self) -> &dyn DensityModel {
        self.model.as_ref()
    }

    /// Owned data, including the current values of missing cells.
    pub fn data(&self) -> &DataBlock {
        &self.data
    }

    /// Number of samples in the block.
    pub fn n_sample(&self) -> usize {
        self.data.n_rows()
    }

    /// Size and default the model's parameters.
    pub fn initialize_step(&mut self) -> MixtureResult<()> {
        self.model
            .initialize(&self.data)
            .map_err(|e| match e {
                e @ MixtureError::InitializeStepFail { .. } => e,
                other => MixtureError::InitializeStepFail {
                    context: format!("block '{}': {other}", self.data.name()),
                },
            })?;
        self.accumulator.resize(self.model.layout());
        Ok(())
    }

    /// Randomized starting parameters.
    pub fn random_init(
        &mut self,
        tik: &[f64],
        nk: &[f64],
        rng: &mut MixtureRng,
    ) -> MixtureResult<()> {
        self.model.random_init(&self.data, tik, nk, rng)
    }

    /// Log density of sample `i` under cluster `k`.
    #[inline]
    pub fn e_step_log_probability(&self, i: usize, k: usize) -> f64 {
        self.model.log_density(&self.data, i, k)
    }

    /// Re-estimate the model's parameters.
    pub fn m_step(&mut self, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
        self.model.run(&self.data, tik, nk)
    }

    /// Replace each missing cell by its point estimate given row `i` of
    /// `tik` (`n_cluster` wide).
    pub fn imputation_step(&mut self, tik: &[f64], n_cluster: usize) {
        let values: Vec<f64> = self
            .data
            .missing()
            .iter()
            .map(|&(i, j)| {
                let weights = &tik[i * n_cluster..(i + 1) * n_cluster];
                self.model.impute(&self.data, i, j, weights)
            })
            .collect();
        self.write_missing(values);
    }

    /// Replace each missing cell by a random draw given row `i` of `tik`.
    pub fn sampling_step(&mut self, tik: &[f64], n_cluster: usize, rng: &mut MixtureRng) {
        let mut values = Vec::with_capacity(self.data.missing().len());
        for &(i, j) in self.data.missing() {
            let weights = &tik[i * n_cluster..(i + 1) * n_cluster];
            values.push(self.model.sample(&self.data, i, j, weights, rng));
        }
        self.write_missing(values);
    }

    fn write_missing(&mut self, values: Vec<f64>) {
        let cells = self.data.missing().to_vec();
        for ((i, j), v) in cells.into_iter().zip(values) {
            self.data.set_missing_value(i, j, v);
        }
    }

    /// Fold the current parameters into the running means.
    pub fn store_intermediate_results(&mut self) -> MixtureResult<()> {
        self.accumulator.update(&self.model.parameters())
    }

    /// Adopt the running means as parameters, then release them. A no-op
    /// when nothing was stored.
    pub fn set_parameters_step(&mut self) -> MixtureResult<()> {
        if let Some(mean) = self.accumulator.mean() {
            self.accumulator.release();
            self.model.set_parameters(&mean)?;
        }
        Ok(())
    }

    /// Drop the running means without using them.
    pub fn release_intermediate_results(&mut self) {
        self.accumulator.release();
    }

    /// Number of snapshots folded since the last release.
    pub fn stored_count(&self) -> usize {
        self.accumulator.count()
    }

    /// Current parameters.
    pub fn parameters(&self) -> ParameterSet {
        self.model.parameters()
    }

    /// Replace the parameters.
    pub fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
        self.model.set_parameters(params)
    }

    /// Free parameters of the model.
    pub fn free_parameter_count(&self) -> usize {
        self.model.free_parameter_count()
    }
}
