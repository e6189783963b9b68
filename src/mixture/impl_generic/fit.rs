//! Tensor boundary of mixture estimation.
//!
//! Blocks are copied to the host once, estimation runs on the host core in
//! `f64`, and the results come back as tensors on the device and in the
//! dtype of the first input block. No cast runs on the device, so backends
//! without F64 support (WebGPU) take F32 blocks directly.

use super::bridge::Bridge;
use super::composer::Composer;
use super::criterion::composer_criterion;
use super::registry::ModelRegistry;
use super::select::{fit_blocks, select_blocks, HostBlock};
use super::strategy::StrategyOutcome;
use crate::mixture::block::DataBlock;
use crate::mixture::error::MixtureError;
use crate::mixture::traits::criterion::CriterionKind;
use crate::mixture::traits::density::MixtureRng;
use crate::mixture::traits::mixture::{
    BlockParameters, MixtureBlock, MixtureModel, MixtureOptions, MixtureSelection,
    SelectionOptions,
};
use crate::mixture::validation::{
    validate_data_2d, validate_mixture_dtype, validate_n_cluster, validate_same_rows,
};
use numr::dtype::DType;
use numr::error::{Error, Result};
use numr::runtime::{Runtime, RuntimeClient};
use numr::tensor::Tensor;
use rand::SeedableRng;
use tracing::debug;

/// Trait bounds needed for mixture estimation.
pub trait MixtureClient<R: Runtime>: RuntimeClient<R> {}

impl<R, C> MixtureClient<R> for C
where
    R: Runtime,
    C: RuntimeClient<R>,
{
}

fn to_host<R: Runtime>(tensor: &Tensor<R>) -> Vec<f64> {
    let tensor = tensor.contiguous();
    match tensor.dtype() {
        DType::F32 => {
            let values: Vec<f32> = tensor.to_vec();
            values.into_iter().map(f64::from).collect()
        }
        _ => tensor.to_vec(),
    }
}

fn to_device<R: Runtime>(
    values: &[f64],
    shape: &[usize],
    dtype: DType,
    device: &R::Device,
) -> Tensor<R> {
    match dtype {
        DType::F32 => {
            let narrowed: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            Tensor::<R>::from_slice(&narrowed, shape, device)
        }
        _ => Tensor::<R>::from_slice(values, shape, device),
    }
}

/// Validate and copy every block to the host.
fn host_blocks<R: Runtime>(blocks: &[MixtureBlock<R>], op: &'static str) -> Result<Vec<HostBlock>> {
    if blocks.is_empty() {
        return Err(Error::InvalidArgument {
            arg: "blocks",
            reason: format!("{op} requires at least one block"),
        });
    }
    let mut shapes = Vec::with_capacity(blocks.len());
    for block in blocks {
        validate_mixture_dtype(block.data.dtype(), op)?;
        validate_data_2d(block.data.shape(), op)?;
        shapes.push(block.data.shape().to_vec());
    }
    validate_same_rows(&shapes, op)?;

    blocks
        .iter()
        .map(|block| {
            let shape = block.data.shape();
            let values = to_host(&block.data);
            let data = DataBlock::new(block.name.clone(), shape[0], shape[1], values)?;
            Ok(HostBlock {
                model: block.model,
                data,
            })
        })
        .collect()
}

/// Output dtype and device, taken from the first block.
fn output_target<R: Runtime>(blocks: &[MixtureBlock<R>]) -> Result<(DType, R::Device)> {
    let first = blocks.first().ok_or_else(|| Error::InvalidArgument {
        arg: "blocks",
        reason: "at least one block is required".to_string(),
    })?;
    Ok((first.data.dtype(), first.data.device().clone()))
}

fn labels_tensor<R: Runtime>(zi: &[usize], device: &R::Device) -> Tensor<R> {
    let labels: Vec<i64> = zi.iter().map(|&z| z as i64).collect();
    Tensor::<R>::from_slice(&labels, &[labels.len()], device)
}

/// Fitted model from the winning composer of a strategy.
fn model_from_outcome<R: Runtime>(
    outcome: StrategyOutcome,
    criterion: CriterionKind,
    dtype: DType,
    device: &R::Device,
) -> MixtureModel<R> {
    let composer = &outcome.composer;
    let n = composer.n_sample();
    let k = composer.n_cluster();

    let blocks = composer
        .bridges()
        .iter()
        .map(|bridge| BlockParameters {
            name: bridge.name().to_string(),
            model: bridge.model_id(),
            n_var: bridge.data().n_cols(),
            parameters: bridge.parameters(),
        })
        .collect();
    let densities = composer
        .bridges()
        .iter()
        .map(|bridge| bridge.model().clone_box())
        .collect();

    MixtureModel {
        n_cluster: k,
        proportions_kind: composer.proportions(),
        proportions: to_device(composer.pk(), &[k], dtype, device),
        responsibilities: to_device(composer.tik(), &[n, k], dtype, device),
        labels: labels_tensor(composer.zi(), device),
        blocks,
        ln_likelihood: composer.ln_likelihood(),
        n_free_parameters: composer.nb_free_parameters(),
        criterion,
        criterion_value: composer_criterion(criterion, composer),
        n_iter: outcome.run.n_iter,
        converged: outcome.run.converged,
        diagnostics: outcome.diagnostics,
        densities,
    }
}

/// Fit a K-cluster mixture over one or more blocks.
pub fn mixture_fit_impl<R, C>(
    _client: &C,
    blocks: &[MixtureBlock<R>],
    options: &MixtureOptions,
) -> Result<MixtureModel<R>>
where
    R: Runtime,
    C: MixtureClient<R>,
{
    let host = host_blocks(blocks, "mixture_fit")?;
    let (dtype, device) = output_target(blocks)?;
    validate_n_cluster(options.n_cluster, host[0].data.n_rows(), "mixture_fit")?;
    debug!(
        n_sample = host[0].data.n_rows(),
        n_block = host.len(),
        n_cluster = options.n_cluster,
        "mixture fit"
    );

    let mut rng = MixtureRng::seed_from_u64(options.seed);
    let outcome = fit_blocks(&ModelRegistry::with_defaults(), &host, options, &mut rng)?;
    Ok(model_from_outcome(outcome, options.criterion, dtype, &device))
}

/// Fit every (families, K) candidate and keep the best by criterion.
pub fn mixture_select_impl<R, C>(
    _client: &C,
    blocks: &[MixtureBlock<R>],
    options: &SelectionOptions,
) -> Result<MixtureSelection<R>>
where
    R: Runtime,
    C: MixtureClient<R>,
{
    let host = host_blocks(blocks, "mixture_select")?;
    let (dtype, device) = output_target(blocks)?;

    let mut rng = MixtureRng::seed_from_u64(options.base.seed);
    let selection = select_blocks(&ModelRegistry::with_defaults(), &host, options, &mut rng)?;
    Ok(MixtureSelection {
        best: model_from_outcome(selection.best, options.criterion, dtype, &device),
        candidates: selection.candidates,
    })
}

/// Composer holding the fitted densities over new data, after one E-step,
/// an imputation of missing cells and a second E-step.
fn posterior_composer<R: Runtime>(
    model: &MixtureModel<R>,
    blocks: &[MixtureBlock<R>],
    op: &'static str,
) -> Result<Composer> {
    let host = host_blocks(blocks, op)?;
    if host.len() != model.blocks.len() {
        return Err(Error::InvalidArgument {
            arg: "blocks",
            reason: format!(
                "{op}: model has {} blocks, got {}",
                model.blocks.len(),
                host.len()
            ),
        });
    }

    let mut composer = Composer::scoring(host[0].data.n_rows(), model.n_cluster)?;
    composer.set_proportions(model.proportions_kind);
    for ((fitted, density), block) in model.blocks.iter().zip(&model.densities).zip(host) {
        if fitted.name != block.data.name() {
            return Err(Error::InvalidArgument {
                arg: "blocks",
                reason: format!(
                    "{op}: expected block '{}', got '{}'",
                    fitted.name,
                    block.data.name()
                ),
            });
        }
        if fitted.n_var != block.data.n_cols() {
            return Err(MixtureError::ShapeMismatch {
                expected: fitted.n_var,
                got: block.data.n_cols(),
                context: format!("{op}: columns of block '{}'", fitted.name),
            }
            .into());
        }
        composer.register_bridge(Bridge::new(density.clone_box(), block.data))?;
    }

    let mut pk = to_host(&model.proportions);
    let total: f64 = pk.iter().sum();
    pk.iter_mut().for_each(|p| *p /= total);
    composer.set_pk(&pk)?;
    composer.mark_param_initialized();

    composer.e_step()?;
    composer.imputation_step();
    composer.e_step()?;
    Ok(composer)
}

/// Cluster probabilities [n, K] of new samples.
pub fn mixture_predict_proba_impl<R, C>(
    _client: &C,
    model: &MixtureModel<R>,
    blocks: &[MixtureBlock<R>],
) -> Result<Tensor<R>>
where
    R: Runtime,
    C: MixtureClient<R>,
{
    let composer = posterior_composer(model, blocks, "mixture_predict_proba")?;
    let (dtype, device) = output_target(blocks)?;
    Ok(to_device(
        composer.tik(),
        &[composer.n_sample(), composer.n_cluster()],
        dtype,
        &device,
    ))
}

/// Most probable cluster [n] (I64) of new samples.
pub fn mixture_predict_impl<R, C>(
    _client: &C,
    model: &MixtureModel<R>,
    blocks: &[MixtureBlock<R>],
) -> Result<Tensor<R>>
where
    R: Runtime,
    C: MixtureClient<R>,
{
    let composer = posterior_composer(model, blocks, "mixture_predict")?;
    let (_, device) = output_target(blocks)?;
    Ok(labels_tensor(composer.zi(), &device))
}
