//! Mixture estimation trait and its input/output types.

use super::criterion::CriterionKind;
use super::density::{DensityModel, ModelId, ParameterSet};
use super::strategy::StrategyOptions;
use numr::error::Result;
use numr::runtime::Runtime;
use numr::tensor::Tensor;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How the mixing proportions are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Proportions {
    /// Estimated at every M-step as the mean responsibility.
    #[default]
    Free,
    /// Frozen at 1/K.
    Equal,
}

/// One block of variables [n, d] and the family that models it.
///
/// NaN entries mark missing cells. Every block of a fit must have the same
/// number of rows.
#[derive(Debug, Clone)]
pub struct MixtureBlock<R: Runtime> {
    /// Block name, unique within a fit.
    pub name: String,
    /// Data [n, d], F32 or F64.
    pub data: Tensor<R>,
    /// Density family.
    pub model: ModelId,
}

impl<R: Runtime> MixtureBlock<R> {
    /// Block from its parts.
    pub fn new(name: impl Into<String>, data: Tensor<R>, model: ModelId) -> Self {
        Self {
            name: name.into(),
            data,
            model,
        }
    }
}

/// Options for fitting one mixture with a fixed number of clusters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MixtureOptions {
    /// Number of clusters K.
    pub n_cluster: usize,
    /// Free or equal proportions.
    pub proportions: Proportions,
    /// Multi-trial search settings.
    pub strategy: StrategyOptions,
    /// Criterion reported with the fitted model.
    pub criterion: CriterionKind,
    /// Seed of the random generator driving every stochastic step.
    pub seed: u64,
    /// Known cluster of each sample (`None` = unlabelled). Labelled samples
    /// keep a one-hot responsibility row throughout.
    pub known_labels: Option<Vec<Option<usize>>>,
}

impl Default for MixtureOptions {
    fn default() -> Self {
        Self {
            n_cluster: 2,
            proportions: Proportions::Free,
            strategy: StrategyOptions::default(),
            criterion: CriterionKind::Bic,
            seed: 0,
            known_labels: None,
        }
    }
}

/// Estimated parameters of one block.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BlockParameters {
    /// Block name.
    pub name: String,
    /// Density family.
    pub model: ModelId,
    /// Number of variables of the block.
    pub n_var: usize,
    /// Parameters in the family's layout.
    pub parameters: ParameterSet,
}

/// Fitted mixture.
#[derive(Debug, Clone)]
pub struct MixtureModel<R: Runtime> {
    /// Number of clusters.
    pub n_cluster: usize,
    /// Proportions treatment used during the fit.
    pub proportions_kind: Proportions,
    /// Mixing proportions [K].
    pub proportions: Tensor<R>,
    /// Responsibilities of the training samples [n, K].
    pub responsibilities: Tensor<R>,
    /// Most probable cluster of each training sample [n], I64.
    pub labels: Tensor<R>,
    /// Parameters per block, in input order.
    pub blocks: Vec<BlockParameters>,
    /// Final log-likelihood.
    pub ln_likelihood: f64,
    /// Free parameters counted by the criterion.
    pub n_free_parameters: usize,
    /// Criterion used for `criterion_value`.
    pub criterion: CriterionKind,
    /// Criterion value (lower is better).
    pub criterion_value: f64,
    /// Iterations of the long run.
    pub n_iter: usize,
    /// Whether the long run met its tolerance.
    pub converged: bool,
    /// Failed attempts, with their failure kind.
    pub diagnostics: Vec<String>,
    /// Fitted density of each block, used for prediction.
    pub(crate) densities: Vec<Box<dyn DensityModel>>,
}

/// Options for model selection over families and cluster counts.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectionOptions {
    /// Cluster counts to try.
    pub n_clusters: Vec<usize>,
    /// Family combinations to try, one model per block in block order.
    /// Empty means the models given on the blocks.
    pub model_sets: Vec<Vec<ModelId>>,
    /// Ranking criterion.
    pub criterion: CriterionKind,
    /// Settings shared by every candidate fit. `n_cluster` and `criterion`
    /// are overridden per candidate.
    pub base: MixtureOptions,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            n_clusters: vec![1, 2, 3, 4],
            model_sets: Vec::new(),
            criterion: CriterionKind::Bic,
            base: MixtureOptions::default(),
        }
    }
}

/// Score of one (families, K) candidate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CandidateScore {
    /// One model per block.
    pub models: Vec<ModelId>,
    /// Cluster count.
    pub n_cluster: usize,
    /// Criterion value, `None` when the candidate failed.
    pub criterion_value: Option<f64>,
    /// Failure message of a failed candidate.
    pub error: Option<String>,
}

/// Outcome of model selection.
#[derive(Debug, Clone)]
pub struct MixtureSelection<R: Runtime> {
    /// Best candidate.
    pub best: MixtureModel<R>,
    /// Every candidate, sorted best first; failed candidates last.
    pub candidates: Vec<CandidateScore>,
}

/// Finite mixture estimation algorithms.
pub trait MixtureAlgorithms<R: Runtime> {
    /// Fit a K-cluster mixture over one or more blocks.
    fn mixture_fit(
        &self,
        blocks: &[MixtureBlock<R>],
        options: &MixtureOptions,
    ) -> Result<MixtureModel<R>>;

    /// Fit every (families, K) candidate and keep the best by criterion.
    fn mixture_select(
        &self,
        blocks: &[MixtureBlock<R>],
        options: &SelectionOptions,
    ) -> Result<MixtureSelection<R>>;

    /// Cluster probabilities [n, K] of new samples under a fitted model.
    fn mixture_predict_proba(
        &self,
        model: &MixtureModel<R>,
        blocks: &[MixtureBlock<R>],
    ) -> Result<Tensor<R>>;

    /// Most probable cluster [n] (I64) of new samples.
    fn mixture_predict(
        &self,
        model: &MixtureModel<R>,
        blocks: &[MixtureBlock<R>],
    ) -> Result<Tensor<R>>;
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::mixture::traits::algorithm::AlgorithmKind;

    #[test]
    fn test_options_from_json() {
        let mut options = SelectionOptions {
            n_clusters: vec![2, 3],
            model_sets: vec![vec![ModelId::GaussianSk], vec![ModelId::GammaAkBk]],
            criterion: CriterionKind::Icl,
            ..SelectionOptions::default()
        };
        options.base.strategy.long_algo.kind = AlgorithmKind::Cem;
        options.base.known_labels = Some(vec![Some(0), None, Some(1)]);

        let json = serde_json::to_string(&options).unwrap();
        let back: SelectionOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
