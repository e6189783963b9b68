//! Generic mixture estimation.
//!
//! The host core (`composer`, `bridge`, `accumulator`, `algorithm`,
//! `strategy`) works on `f64` buffers; `fit` is the tensor boundary shared
//! by every backend.

pub mod accumulator;
pub mod algorithm;
pub mod bridge;
pub mod composer;
pub mod criterion;
pub mod fit;
pub mod init;
pub mod registry;
pub mod select;
pub mod strategy;

pub use accumulator::ParameterAccumulator;
pub use algorithm::{run_algorithm, AlgorithmRun};
pub use bridge::Bridge;
pub use composer::{Composer, ComposerState};
pub use criterion::{aic, bic, composer_criterion, icl};
pub use fit::{
    mixture_fit_impl, mixture_predict_impl, mixture_predict_proba_impl, mixture_select_impl,
    MixtureClient,
};
pub use init::initialize_parameters;
pub use registry::{ModelConstructor, ModelRegistry};
pub use select::{
    build_composer, fit_blocks, select_blocks, validate_options, HostBlock, SelectionOutcome,
};
pub use strategy::{run_strategy, StrategyOutcome};

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Composer, ModelRegistry};
    use crate::mixture::block::DataBlock;
    use crate::mixture::error::{MixtureError, MixtureResult};
    use crate::mixture::families::DiagonalGaussian;
    use crate::mixture::traits::density::{
        DensityModel, MixtureRng, ModelId, ParameterLayout, ParameterSet,
    };
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Row-major values of `n` points in 2-D: the first half around (0, 0),
    /// the second around (6, 6), unit variance.
    pub fn two_cluster_values(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = MixtureRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        (0..n)
            .flat_map(|i| {
                let center = if i < n / 2 { 0.0 } else { 6.0 };
                [center, center]
            })
            .map(|c| c + noise.sample(&mut rng))
            .collect()
    }

    /// Block "x" built from [`two_cluster_values`].
    pub fn two_cluster_data(n: usize, seed: u64) -> DataBlock {
        DataBlock::new("x", n, 2, two_cluster_values(n, seed)).unwrap()
    }

    /// Composer with one `gaussian_sjk` block, still in the `Created` state.
    pub fn gaussian_composer(data: &DataBlock, n_cluster: usize) -> Composer {
        let mut composer = Composer::new(data.n_rows(), n_cluster).unwrap();
        composer
            .create_mixture(
                &ModelRegistry::with_defaults(),
                ModelId::GaussianSjk,
                data.clone(),
            )
            .unwrap();
        composer
    }

    /// Gaussian whose first `failures` random initializations fail.
    #[derive(Debug, Clone)]
    pub struct FlakyModel {
        inner: DiagonalGaussian,
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    impl FlakyModel {
        pub fn new(n_cluster: usize, failures: usize) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let model = Self {
                inner: DiagonalGaussian::new(ModelId::GaussianSjk, n_cluster).unwrap(),
                calls: Arc::clone(&calls),
                failures,
            };
            (model, calls)
        }
    }

    impl DensityModel for FlakyModel {
        fn id(&self) -> ModelId {
            self.inner.id()
        }

        fn n_cluster(&self) -> usize {
            self.inner.n_cluster()
        }

        fn layout(&self) -> ParameterLayout {
            self.inner.layout()
        }

        fn initialize(&mut self, data: &DataBlock) -> MixtureResult<()> {
            self.inner.initialize(data)
        }

        fn log_density(&self, data: &DataBlock, i: usize, k: usize) -> f64 {
            self.inner.log_density(data, i, k)
        }

        fn random_init(
            &mut self,
            data: &DataBlock,
            tik: &[f64],
            nk: &[f64],
            rng: &mut MixtureRng,
        ) -> MixtureResult<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(MixtureError::RandomInitFail {
                    context: format!("forced failure {call}"),
                });
            }
            self.inner.random_init(data, tik, nk, rng)
        }

        fn run(&mut self, data: &DataBlock, tik: &[f64], nk: &[f64]) -> MixtureResult<()> {
            self.inner.run(data, tik, nk)
        }

        fn impute(&self, data: &DataBlock, i: usize, j: usize, weights: &[f64]) -> f64 {
            self.inner.impute(data, i, j, weights)
        }

        fn sample(
            &self,
            data: &DataBlock,
            i: usize,
            j: usize,
            weights: &[f64],
            rng: &mut MixtureRng,
        ) -> f64 {
            self.inner.sample(data, i, j, weights, rng)
        }

        fn free_parameter_count(&self) -> usize {
            self.inner.free_parameter_count()
        }

        fn parameters(&self) -> ParameterSet {
            self.inner.parameters()
        }

        fn set_parameters(&mut self, params: &ParameterSet) -> MixtureResult<()> {
            self.inner.set_parameters(params)
        }

        fn clone_box(&self) -> Box<dyn DensityModel> {
            Box::new(self.clone())
        }
    }
}
