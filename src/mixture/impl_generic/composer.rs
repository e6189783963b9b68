//! Joint mixture over several blocks.
//!
//! The composer owns the responsibility matrix `tik` (row-major `[n, K]`),
//! the proportions `pk`, the counts `nk` and the labels `zi`, and an ordered
//! list of bridges. Blocks are independent given the cluster, so the log
//! density of a sample under cluster `k` is the sum of the block terms.
//!
//! Every step computes into scratch buffers and commits only on success. A
//! failed step moves the composer to [`ComposerState::Failed`]; the owning
//! strategy discards it.

use super::accumulator::ParameterAccumulator;
use super::bridge::Bridge;
use super::registry::ModelRegistry;
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::families::draw_cluster;
use crate::mixture::families::special::argmax;
use crate::mixture::traits::density::{
    MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
use crate::mixture::traits::mixture::Proportions;
use rayon::prelude::*;

/// Lifecycle of a composer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposerState {
    /// Bridges may still be registered.
    Created,
    /// Every block has default parameters.
    Initialized,
    /// A starting point (random or given parameters) is in place.
    ParamInitialized,
    /// At least one E/M step ran since the starting point.
    Iterating,
    /// Final likelihood computed, accumulators released.
    Finalized,
    /// A step failed; the instance must be discarded.
    Failed,
}

/// Orchestrator of the joint E/M iteration.
#[derive(Debug, Clone)]
pub struct Composer {
    n_sample: usize,
    n_cluster: usize,
    proportions: Proportions,
    tik: Vec<f64>,
    pk: Vec<f64>,
    nk: Vec<f64>,
    zi: Vec<usize>,
    known_labels: Option<Vec<Option<usize>>>,
    bridges: Vec<Bridge>,
    pk_accumulator: ParameterAccumulator,
    ln_likelihood: f64,
    state: ComposerState,
}

/// Log-sum-exp over the finite entries of `values`; `None` when there is
/// no finite entry.
pub(crate) fn log_sum_exp(values: &[f64]) -> Option<f64> {
    let max = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))?;
    let sum: f64 = values
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - max).exp())
        .sum();
    Some(max + sum.ln())
}

/// Turn a row of log weights into probabilities in place. Non-finite
/// entries get zero probability. Returns `false` when no entry is finite.
fn normalize_log_row(row: &mut [f64]) -> bool {
    let Some(lse) = log_sum_exp(row) else {
        return false;
    };
    for v in row.iter_mut() {
        *v = if v.is_nan() { 0.0 } else { (*v - lse).exp() };
    }
    true
}

impl Composer {
    /// Empty composer for `n_sample` samples and `n_cluster` clusters.
    pub fn new(n_sample: usize, n_cluster: usize) -> MixtureResult<Self> {
        let composer = Self::scoring(n_sample, n_cluster)?;
        if n_sample < n_cluster {
            return Err(MixtureError::InvalidParameter {
                parameter: "n_cluster".to_string(),
                message: format!("{n_cluster} clusters exceed {n_sample} samples"),
            });
        }
        Ok(composer)
    }

    /// Composer that only evaluates already fitted densities, so it may
    /// hold fewer samples than clusters.
    pub(crate) fn scoring(n_sample: usize, n_cluster: usize) -> MixtureResult<Self> {
        if n_cluster == 0 {
            return Err(MixtureError::InvalidParameter {
                parameter: "n_cluster".to_string(),
                message: "must be > 0".to_string(),
            });
        }
        let uniform = 1.0 / n_cluster as f64;
        Ok(Self {
            n_sample,
            n_cluster,
            proportions: Proportions::Free,
            tik: vec![uniform; n_sample * n_cluster],
            pk: vec![uniform; n_cluster],
            nk: vec![n_sample as f64 * uniform; n_cluster],
            zi: vec![0; n_sample],
            known_labels: None,
            bridges: Vec::new(),
            pk_accumulator: ParameterAccumulator::new(Self::pk_layout(n_cluster)),
            ln_likelihood: f64::NEG_INFINITY,
            state: ComposerState::Created,
        })
    }

    fn pk_layout(n_cluster: usize) -> ParameterLayout {
        ParameterLayout::new([("pk", 1, n_cluster)])
    }

    /// Free or equal proportions.
    pub fn set_proportions(&mut self, proportions: Proportions) {
        self.proportions = proportions;
        if proportions == Proportions::Equal {
            self.pk = vec![1.0 / self.n_cluster as f64; self.n_cluster];
        }
    }

    /// Proportions treatment.
    pub fn proportions(&self) -> Proportions {
        self.proportions
    }

    /// Attach a bridge. Only allowed before initialization; its block must
    /// have `n_sample` rows and a name not used yet.
    pub fn register_bridge(&mut self, bridge: Bridge) -> MixtureResult<()> {
        if self.state != ComposerState::Created {
            return Err(MixtureError::InvalidParameter {
                parameter: "bridge".to_string(),
                message: format!("cannot register block '{}' after initialization", bridge.name()),
            });
        }
        if bridge.n_sample() != self.n_sample {
            return Err(MixtureError::ShapeMismatch {
                expected: self.n_sample,
                got: bridge.n_sample(),
                context: format!("rows of block '{}'", bridge.name()),
            });
        }
        if self.bridges.iter().any(|b| b.name() == bridge.name()) {
            return Err(MixtureError::InvalidParameter {
                parameter: "bridge".to_string(),
                message: format!("block '{}' registered twice", bridge.name()),
            });
        }
        self.bridges.push(bridge);
        Ok(())
    }

    /// Build the model for `id` from `registry` and register it on `data`.
    pub fn create_mixture(
        &mut self,
        registry: &ModelRegistry,
        id: ModelId,
        data: DataBlock,
    ) -> MixtureResult<()> {
        let model = registry.create(id, self.n_cluster)?;
        self.register_bridge(Bridge::new(model, data))
    }

    /// Fix the cluster of labelled samples.
    pub fn set_known_labels(&mut self, labels: Vec<Option<usize>>) -> MixtureResult<()> {
        if labels.len() != self.n_sample {
            return Err(MixtureError::ShapeMismatch {
                expected: self.n_sample,
                got: labels.len(),
                context: "known labels".to_string(),
            });
        }
        if let Some(bad) = labels.iter().flatten().find(|&&z| z >= self.n_cluster) {
            return Err(MixtureError::InvalidParameter {
                parameter: "known_labels".to_string(),
                message: format!("label {bad} out of range for {} clusters", self.n_cluster),
            });
        }
        self.known_labels = Some(labels);
        if self.state != ComposerState::Created {
            self.apply_known_labels();
            self.refresh_derived();
        }
        Ok(())
    }

    /// Known label of sample `i`, if any.
    pub fn known_label(&self, i: usize) -> Option<usize> {
        self.known_labels.as_ref().and_then(|l| l[i])
    }

    fn apply_known_labels(&mut self) {
        let Some(labels) = &self.known_labels else {
            return;
        };
        let k = self.n_cluster;
        for (i, z) in labels.iter().enumerate() {
            if let Some(z) = *z {
                let row = &mut self.tik[i * k..(i + 1) * k];
                row.fill(0.0);
                row[z] = 1.0;
            }
        }
    }

    /// Recompute `nk` and `zi` from `tik`.
    fn refresh_derived(&mut self) {
        let k = self.n_cluster;
        let mut nk = vec![0.0; k];
        for row in self.tik.chunks(k) {
            for (acc, &t) in nk.iter_mut().zip(row) {
                *acc += t;
            }
        }
        self.nk = nk;
        self.zi = self
            .tik
            .chunks(k)
            .map(|row| argmax(row).unwrap_or(0))
            .collect();
    }

    fn fail<T>(&mut self, err: MixtureError) -> MixtureResult<T> {
        self.state = ComposerState::Failed;
        Err(err)
    }

    fn guard(&self, step: &str) -> MixtureResult<()> {
        match self.state {
            ComposerState::Created | ComposerState::Failed => Err(MixtureError::EstimFail {
                context: format!("{step} called in state {:?}", self.state),
            }),
            _ => Ok(()),
        }
    }

    fn advance(&mut self) {
        if matches!(
            self.state,
            ComposerState::ParamInitialized | ComposerState::Finalized
        ) {
            self.state = ComposerState::Iterating;
        }
    }

    /// Give every block its default parameters and reset the joint state.
    pub fn initialize_step(&mut self) -> MixtureResult<()> {
        if self.bridges.is_empty() {
            return Err(MixtureError::InvalidParameter {
                parameter: "bridge".to_string(),
                message: "no block registered".to_string(),
            });
        }
        for idx in 0..self.bridges.len() {
            if let Err(err) = self.bridges[idx].initialize_step() {
                return self.fail(err);
            }
        }
        let uniform = 1.0 / self.n_cluster as f64;
        self.tik.fill(uniform);
        self.pk = vec![uniform; self.n_cluster];
        self.apply_known_labels();
        self.refresh_derived();
        self.pk_accumulator.resize(Self::pk_layout(self.n_cluster));
        self.ln_likelihood = f64::NEG_INFINITY;
        self.state = ComposerState::Initialized;
        Ok(())
    }

    /// Let every block draw random parameters. Failures are forwarded
    /// unmodified.
    pub fn random_init(&mut self, rng: &mut MixtureRng) -> MixtureResult<()> {
        self.guard("random_init")?;
        for idx in 0..self.bridges.len() {
            let result = self.bridges[idx].random_init(&self.tik, &self.nk, rng);
            if let Err(err) = result {
                return self.fail(err);
            }
        }
        Ok(())
    }

    /// Mark the starting point as set.
    pub(crate) fn mark_param_initialized(&mut self) {
        self.state = ComposerState::ParamInitialized;
    }

    /// Sum of block log densities of sample `i` under cluster `k`.
    ///
    /// NaN block terms (degenerate parameters) are skipped; the result is
    /// NaN only when every block is degenerate for this cluster.
    pub fn log_component_probability(&self, i: usize, k: usize) -> f64 {
        let mut total = 0.0;
        let mut any = false;
        for bridge in &self.bridges {
            let v = bridge.e_step_log_probability(i, k);
            if !v.is_nan() {
                total += v;
                any = true;
            }
        }
        if any {
            total
        } else {
            f64::NAN
        }
    }

    /// Posterior responsibilities from the current parameters.
    pub fn e_step(&mut self) -> MixtureResult<()> {
        self.guard("e_step")?;
        let k = self.n_cluster;
        let ln_pk: Vec<f64> = self.pk.iter().map(|p| p.ln()).collect();
        let known = self.known_labels.as_deref();

        let mut tik = vec![0.0; self.n_sample * k];
        let this = &*self;
        let failed = tik
            .par_chunks_mut(k)
            .enumerate()
            .filter_map(|(i, row)| {
                if let Some(z) = known.and_then(|l| l[i]) {
                    row[z] = 1.0;
                    return None;
                }
                for (c, t) in row.iter_mut().enumerate() {
                    *t = ln_pk[c] + this.log_component_probability(i, c);
                }
                (!normalize_log_row(row)).then_some(i)
            })
            .min();

        if let Some(sample) = failed {
            return self.fail(MixtureError::EStepFail {
                sample,
                context: "no cluster has a finite log-probability".to_string(),
            });
        }
        self.tik = tik;
        self.refresh_derived();
        self.advance();
        Ok(())
    }

    /// Replace every responsibility row by a one-hot vector at its largest
    /// entry (lowest index on ties).
    pub fn c_step(&mut self) -> MixtureResult<()> {
        self.guard("c_step")?;
        let k = self.n_cluster;
        let mut tik = vec![0.0; self.n_sample * k];
        let mut degenerate = None;
        for (i, row) in self.tik.chunks(k).enumerate() {
            match argmax(row).filter(|&z| row[z] > 0.0) {
                Some(z) => tik[i * k + z] = 1.0,
                None => {
                    degenerate = Some(i);
                    break;
                }
            }
        }
        if let Some(sample) = degenerate {
            return self.fail(MixtureError::CStepFail { sample });
        }
        self.tik = tik;
        self.refresh_derived();
        self.advance();
        Ok(())
    }

    /// Replace every unlabelled responsibility row by a one-hot vector at a
    /// cluster drawn from it.
    pub fn s_step(&mut self, rng: &mut MixtureRng) -> MixtureResult<()> {
        self.guard("s_step")?;
        let k = self.n_cluster;
        let mut tik = vec![0.0; self.n_sample * k];
        for i in 0..self.n_sample {
            let z = match self.known_label(i) {
                Some(z) => z,
                None => match draw_cluster(&self.tik[i * k..(i + 1) * k], rng) {
                    Some(z) => z,
                    None => return self.fail(MixtureError::SStepFail { sample: i }),
                },
            };
            tik[i * k + z] = 1.0;
        }
        self.tik = tik;
        self.refresh_derived();
        self.advance();
        Ok(())
    }

    /// Update counts and proportions, then every block's parameters.
    ///
    /// Blocks updated before a failing block are restored, so a failed
    /// M-step leaves every parameter as it was.
    pub fn m_step(&mut self) -> MixtureResult<()> {
        self.guard("m_step")?;
        self.refresh_derived();
        let pk = match self.proportions {
            Proportions::Free => self.nk.iter().map(|&w| w / self.n_sample as f64).collect(),
            Proportions::Equal => vec![1.0 / self.n_cluster as f64; self.n_cluster],
        };

        let snapshot: Vec<ParameterSet> = self.bridges.iter().map(Bridge::parameters).collect();
        for idx in 0..self.bridges.len() {
            let result = self.bridges[idx].m_step(&self.tik, &self.nk);
            if let Err(err) = result {
                for (bridge, params) in self.bridges[..idx].iter_mut().zip(&snapshot) {
                    // Same layout as the snapshot: cannot be rejected.
                    bridge.set_parameters(params).ok();
                }
                return self.fail(err);
            }
        }
        self.pk = pk;
        self.advance();
        Ok(())
    }

    /// Replace every missing cell by its point estimate.
    pub fn imputation_step(&mut self) {
        let k = self.n_cluster;
        for bridge in &mut self.bridges {
            bridge.imputation_step(&self.tik, k);
        }
    }

    /// Replace every missing cell by a random draw.
    pub fn sampling_step(&mut self, rng: &mut MixtureRng) {
        let k = self.n_cluster;
        for bridge in &mut self.bridges {
            bridge.sampling_step(&self.tik, k, rng);
        }
    }

    /// Fold current parameters (and free proportions) into the running means.
    pub fn store_intermediate_results(&mut self) -> MixtureResult<()> {
        for idx in 0..self.bridges.len() {
            if let Err(err) = self.bridges[idx].store_intermediate_results() {
                return self.fail(err);
            }
        }
        if self.proportions == Proportions::Free {
            let stored = ParameterArray::new("pk", 1, self.n_cluster, self.pk.clone())
                .and_then(|pk| self.pk_accumulator.update(&ParameterSet::new(vec![pk])));
            if let Err(err) = stored {
                return self.fail(err);
            }
        }
        Ok(())
    }

    /// Adopt the averaged parameters, then release the running means.
    pub fn set_parameters_step(&mut self) -> MixtureResult<()> {
        for idx in 0..self.bridges.len() {
            if let Err(err) = self.bridges[idx].set_parameters_step() {
                return self.fail(err);
            }
        }
        if let Some(mean) = self.pk_accumulator.mean() {
            self.pk_accumulator.release();
            let pk = match mean.require("pk") {
                Ok(array) => array.values.clone(),
                Err(err) => return self.fail(err),
            };
            let total: f64 = pk.iter().sum();
            self.pk = pk.into_iter().map(|p| p / total).collect();
        }
        Ok(())
    }

    /// Drop the running means without using them.
    pub fn release_intermediate_results(&mut self) {
        for bridge in &mut self.bridges {
            bridge.release_intermediate_results();
        }
        self.pk_accumulator.release();
    }

    fn row_ln_likelihood(&self, i: usize) -> f64 {
        if let Some(z) = self.known_label(i) {
            return self.pk[z].ln() + self.log_component_probability(i, z);
        }
        let terms: Vec<f64> = (0..self.n_cluster)
            .map(|k| self.pk[k].ln() + self.log_component_probability(i, k))
            .collect();
        log_sum_exp(&terms).unwrap_or(f64::NEG_INFINITY)
    }

    /// Observed-data log-likelihood (complete-data for labelled samples).
    pub fn compute_ln_likelihood(&mut self) -> MixtureResult<f64> {
        self.guard("compute_ln_likelihood")?;
        let this = &*self;
        let rows: Vec<f64> = (0..self.n_sample)
            .into_par_iter()
            .map(|i| this.row_ln_likelihood(i))
            .collect();
        if let Some(i) = rows.iter().position(|v| !v.is_finite()) {
            return self.fail(MixtureError::EstimFail {
                context: format!("log-likelihood of sample {i} is {}", rows[i]),
            });
        }
        self.ln_likelihood = rows.iter().sum();
        Ok(self.ln_likelihood)
    }

    /// Refresh responsibilities and likelihood from the final parameters and
    /// release the running means. Calling it twice gives the same result.
    pub fn finalize_step(&mut self) -> MixtureResult<f64> {
        self.e_step()?;
        let ll = self.compute_ln_likelihood()?;
        self.release_intermediate_results();
        self.state = ComposerState::Finalized;
        Ok(ll)
    }

    /// Classification entropy `-Σ tik ln tik`.
    pub fn entropy(&self) -> f64 {
        -self
            .tik
            .iter()
            .filter(|&&t| t > 0.0)
            .map(|&t| t * t.ln())
            .sum::<f64>()
    }

    /// Free parameters of every block, plus K-1 for free proportions.
    pub fn nb_free_parameters(&self) -> usize {
        let blocks: usize = self.bridges.iter().map(Bridge::free_parameter_count).sum();
        match self.proportions {
            Proportions::Free => blocks + self.n_cluster - 1,
            Proportions::Equal => blocks,
        }
    }

    /// Responsibilities, row-major `[n, K]`.
    pub fn tik(&self) -> &[f64] {
        &self.tik
    }

    /// Replace the responsibilities (rows must sum to one). Labelled rows are
    /// forced back to one-hot.
    pub(crate) fn set_tik(&mut self, tik: Vec<f64>) {
        debug_assert_eq!(tik.len(), self.n_sample * self.n_cluster);
        self.tik = tik;
        self.apply_known_labels();
        self.refresh_derived();
    }

    /// Mixing proportions.
    pub fn pk(&self) -> &[f64] {
        &self.pk
    }

    /// Replace the proportions. Ignored under equal proportions.
    pub fn set_pk(&mut self, pk: &[f64]) -> MixtureResult<()> {
        if pk.len() != self.n_cluster {
            return Err(MixtureError::ShapeMismatch {
                expected: self.n_cluster,
                got: pk.len(),
                context: "proportions".to_string(),
            });
        }
        let total: f64 = pk.iter().sum();
        if pk.iter().any(|&p| !(p > 0.0)) || (total - 1.0).abs() > 1e-6 {
            return Err(MixtureError::InvalidParameter {
                parameter: "pk".to_string(),
                message: "proportions must be positive and sum to 1".to_string(),
            });
        }
        if self.proportions == Proportions::Free {
            self.pk = pk.to_vec();
        }
        Ok(())
    }

    /// Cluster counts (column sums of `tik`).
    pub fn nk(&self) -> &[f64] {
        &self.nk
    }

    /// Most probable cluster of each sample.
    pub fn zi(&self) -> &[usize] {
        &self.zi
    }

    /// Last computed log-likelihood.
    pub fn ln_likelihood(&self) -> f64 {
        self.ln_likelihood
    }

    /// Number of clusters.
    pub fn n_cluster(&self) -> usize {
        self.n_cluster
    }

    /// Number of samples.
    pub fn n_sample(&self) -> usize {
        self.n_sample
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ComposerState {
        self.state
    }

    /// Registered bridges, in registration order.
    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    fn bridge_index(&self, block: &str) -> MixtureResult<usize> {
        self.bridges
            .iter()
            .position(|b| b.name() == block)
            .ok_or_else(|| MixtureError::UnknownBlock {
                name: block.to_string(),
            })
    }

    /// Parameters of a block.
    pub fn parameters(&self, block: &str) -> MixtureResult<ParameterSet> {
        Ok(self.bridges[self.bridge_index(block)?].parameters())
    }

    /// Replace the parameters of a block. The composer must be initialized.
    pub fn set_parameters(&mut self, block: &str, params: &ParameterSet) -> MixtureResult<()> {
        if matches!(self.state, ComposerState::Created | ComposerState::Failed) {
            return Err(MixtureError::InvalidParameter {
                parameter: "parameters".to_string(),
                message: format!("composer is in state {:?}", self.state),
            });
        }
        let idx = self.bridge_index(block)?;
        self.bridges[idx].set_parameters(params)
    }

    /// Current data of a block, missing cells holding their latest values.
    pub fn block_data(&self, block: &str) -> MixtureResult<&DataBlock> {
        Ok(self.bridges[self.bridge_index(block)?].data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::impl_generic::test_support::{gaussian_composer, two_cluster_data};
    use rand::SeedableRng;

    fn ready_composer() -> Composer {
        let mut composer = gaussian_composer(&two_cluster_data(60, 3), 2);
        composer.initialize_step().unwrap();
        let mut rng = MixtureRng::seed_from_u64(11);
        composer.random_init(&mut rng).unwrap();
        composer.mark_param_initialized();
        composer
    }

    #[test]
    fn test_log_sum_exp() {
        let v = log_sum_exp(&[0.0, 0.0]).unwrap();
        assert!((v - 2.0_f64.ln()).abs() < 1e-12);
        let v = log_sum_exp(&[-1000.0, f64::NEG_INFINITY, f64::NAN]).unwrap();
        assert!((v + 1000.0).abs() < 1e-12);
        assert!(log_sum_exp(&[f64::NAN, f64::NEG_INFINITY]).is_none());
    }

    #[test]
    fn test_e_step_invariants() {
        let mut composer = ready_composer();
        composer.e_step().unwrap();
        assert_eq!(composer.state(), ComposerState::Iterating);

        let k = composer.n_cluster();
        for (i, row) in composer.tik().chunks(k).enumerate() {
            let s: f64 = row.iter().sum();
            assert!((s - 1.0).abs() < 1e-9, "row {i} sums to {s}");
            assert_eq!(composer.zi()[i], argmax(row).unwrap());
        }
    }

    #[test]
    fn test_m_step_counts_match_column_sums() {
        let mut composer = ready_composer();
        composer.e_step().unwrap();
        composer.m_step().unwrap();

        let k = composer.n_cluster();
        for c in 0..k {
            let col: f64 = composer.tik().chunks(k).map(|row| row[c]).sum();
            assert_eq!(composer.nk()[c], col);
        }
        let pk_sum: f64 = composer.pk().iter().sum();
        assert!((pk_sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_c_step_one_hot_lowest_index_on_ties() {
        let mut composer = ready_composer();
        composer.set_tik(vec![0.5; composer.n_sample() * 2]);
        composer.c_step().unwrap();
        assert!(composer.zi().iter().all(|&z| z == 0));
        assert_eq!(composer.nk()[0], composer.n_sample() as f64);
    }

    #[test]
    fn test_s_step_keeps_known_labels() {
        let mut composer = ready_composer();
        let n = composer.n_sample();
        let mut labels = vec![None; n];
        labels[0] = Some(1);
        labels[1] = Some(0);
        composer.set_known_labels(labels).unwrap();
        let mut rng = MixtureRng::seed_from_u64(5);
        composer.e_step().unwrap();
        composer.s_step(&mut rng).unwrap();
        assert_eq!(composer.zi()[0], 1);
        assert_eq!(composer.zi()[1], 0);
        for row in composer.tik().chunks(2) {
            assert!(row == [1.0, 0.0] || row == [0.0, 1.0]);
        }
    }

    #[test]
    fn test_failed_m_step_marks_failed_and_keeps_parameters() {
        let mut composer = ready_composer();
        let before = composer.parameters("x").unwrap();
        // Everything in cluster 0: cluster 1 has no weight.
        let mut tik = vec![0.0; composer.n_sample() * 2];
        tik.chunks_mut(2).for_each(|row| row[0] = 1.0);
        composer.set_tik(tik);

        let err = composer.m_step().unwrap_err();
        assert_eq!(err.kind(), "mStepFail");
        assert_eq!(composer.state(), ComposerState::Failed);
        assert_eq!(composer.parameters("x").unwrap(), before);
        assert!(composer.e_step().is_err());
    }

    #[test]
    fn test_failed_proportion_averaging_marks_failed() {
        let mut composer = ready_composer();
        composer.e_step().unwrap();
        composer.m_step().unwrap();
        composer.pk_accumulator = ParameterAccumulator::new(Composer::pk_layout(3));

        let err = composer.store_intermediate_results().unwrap_err();
        assert_eq!(err.kind(), "shapeMismatch");
        assert_eq!(composer.state(), ComposerState::Failed);
        assert!(composer.e_step().is_err());
    }

    #[test]
    fn test_e_step_fails_when_every_cluster_degenerate() {
        let mut composer = ready_composer();
        // Zero proportions make every term -inf.
        composer.pk = vec![0.0, 0.0];
        let err = composer.e_step().unwrap_err();
        assert!(matches!(err, MixtureError::EStepFail { sample: 0, .. }));
    }

    #[test]
    fn test_finalize_idempotent() {
        let mut composer = ready_composer();
        for _ in 0..5 {
            composer.e_step().unwrap();
            composer.m_step().unwrap();
        }
        let first = composer.finalize_step().unwrap();
        let second = composer.finalize_step().unwrap();
        assert_eq!(first, second);
        assert_eq!(composer.ln_likelihood(), second);
        assert_eq!(composer.state(), ComposerState::Finalized);
    }

    #[test]
    fn test_registration_rules() {
        let data = two_cluster_data(10, 1);
        let mut composer = gaussian_composer(&data, 2);
        let registry = ModelRegistry::with_defaults();

        let short = DataBlock::new("y", 3, 1, vec![0.0, 1.0, 2.0]).unwrap();
        assert!(composer
            .create_mixture(&registry, ModelId::GaussianS, short)
            .is_err());
        assert!(composer
            .create_mixture(&registry, ModelId::GaussianS, data.clone())
            .is_err());

        composer.initialize_step().unwrap();
        let other = DataBlock::new("z", 10, 1, vec![1.0; 10]).unwrap();
        assert!(composer
            .create_mixture(&registry, ModelId::GaussianS, other)
            .is_err());
        assert!(composer.parameters("missing").is_err());
    }

    #[test]
    fn test_free_parameter_count() {
        let mut composer = gaussian_composer(&two_cluster_data(20, 1), 3);
        composer.initialize_step().unwrap();
        // GaussianSjk, d = 2: 3*2 means + 3*2 variances, plus 2 proportions.
        assert_eq!(composer.nb_free_parameters(), 14);
        composer.set_proportions(Proportions::Equal);
        assert_eq!(composer.nb_free_parameters(), 12);
    }
}
