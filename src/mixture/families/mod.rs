//! Density families.
//!
//! Each family implements [`DensityModel`](crate::mixture::DensityModel) for
//! one block of variables assumed independent given the cluster. Tying
//! variants of a family share one struct and differ only in how parameters
//! are pooled.

mod categorical;
mod gamma;
mod gaussian;
mod poisson;
pub(crate) mod special;

pub use categorical::Categorical;
pub use gamma::GammaModel;
pub use gaussian::DiagonalGaussian;
pub use poisson::PoissonModel;

use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::{MixtureRng, ModelId};
use rand::distributions::{Distribution, WeightedIndex};

/// Smallest cluster weight an M-step accepts.
pub(crate) const MIN_CLUSTER_WEIGHT: f64 = 1e-10;

/// Fail the M-step when a cluster has (almost) no weight.
pub(crate) fn check_cluster_weights(id: ModelId, nk: &[f64]) -> MixtureResult<()> {
    for (k, &w) in nk.iter().enumerate() {
        if !(w.is_finite() && w > MIN_CLUSTER_WEIGHT) {
            return Err(MixtureError::MStepFail {
                context: format!("{id}: cluster {k} has total weight {w}"),
            });
        }
    }
    Ok(())
}

/// Fail when `data` does not have the number of variables the model was
/// sized for.
pub(crate) fn check_block_width(id: ModelId, n_var: usize, data: &DataBlock) -> MixtureResult<()> {
    if data.n_cols() != n_var {
        return Err(MixtureError::ShapeMismatch {
            expected: n_var,
            got: data.n_cols(),
            context: format!("{id}: block '{}' width", data.name()),
        });
    }
    Ok(())
}

/// Draw a cluster index from unnormalized weights.
pub(crate) fn draw_cluster(weights: &[f64], rng: &mut MixtureRng) -> Option<usize> {
    WeightedIndex::<f64>::new(weights.iter().copied())
        .ok()
        .map(|dist| dist.sample(rng))
}

/// `k` distinct sample indices, for seeding cluster parameters.
pub(crate) fn distinct_rows(
    id: ModelId,
    n: usize,
    k: usize,
    rng: &mut MixtureRng,
) -> MixtureResult<Vec<usize>> {
    if n < k {
        return Err(MixtureError::RandomInitFail {
            context: format!("{id}: {n} samples cannot seed {k} clusters"),
        });
    }
    Ok(rand::seq::index::sample(rng, n, k).into_vec())
}

/// Weighted per-cluster column means: `[K, d]`.
pub(crate) fn weighted_means(data: &DataBlock, tik: &[f64], nk: &[f64]) -> Vec<f64> {
    let (n, d, kk) = (data.n_rows(), data.n_cols(), nk.len());
    let mut sums = vec![0.0; kk * d];
    for i in 0..n {
        let row = data.row(i);
        for k in 0..kk {
            let t = tik[i * kk + k];
            if t == 0.0 {
                continue;
            }
            for (j, &x) in row.iter().enumerate() {
                sums[k * d + j] += t * x;
            }
        }
    }
    for k in 0..kk {
        for j in 0..d {
            sums[k * d + j] /= nk[k];
        }
    }
    sums
}
