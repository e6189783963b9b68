//! Finite mixture models over heterogeneous data blocks.
//!
//! Each block of variables is modelled by its own density family; blocks are
//! independent given the cluster. Estimation runs EM, CEM or SEM from several
//! starting points and keeps the best; model selection ranks (families, K)
//! candidates by AIC, BIC or ICL. Missing cells (NaN) are imputed or sampled
//! at every iteration.
//!
//! # Example
//!
//! ```ignore
//! use mixr::mixture::{MixtureAlgorithms, MixtureBlock, MixtureOptions, ModelId};
//!
//! let blocks = [MixtureBlock::new("x", data, ModelId::GaussianSjk)];
//! let model = client.mixture_fit(&blocks, &MixtureOptions::default())?;
//! let labels = client.mixture_predict(&model, &blocks)?;
//! ```

mod block;
mod cpu;
pub mod error;
pub mod families;
pub mod impl_generic;
pub mod traits;
mod validation;

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "wgpu")]
mod wgpu;

pub use block::DataBlock;
pub use error::{MixtureError, MixtureResult};
pub use impl_generic::{Composer, ComposerState, ModelRegistry};
pub use traits::algorithm::{AlgorithmKind, AlgorithmOptions};
pub use traits::criterion::CriterionKind;
pub use traits::density::{
    DensityModel, MixtureRng, ModelId, ParameterArray, ParameterLayout, ParameterSet,
};
pub use traits::mixture::{
    BlockParameters, CandidateScore, MixtureAlgorithms, MixtureBlock, MixtureModel,
    MixtureOptions, MixtureSelection, Proportions, SelectionOptions,
};
pub use traits::strategy::{InitMethod, StrategyOptions};
pub use validation::*;
