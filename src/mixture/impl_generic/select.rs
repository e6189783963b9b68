//! Host-side fitting and model selection over (families, K) candidates.

use super::composer::Composer;
use super::criterion::composer_criterion;
use super::registry::ModelRegistry;
use super::strategy::{run_strategy, StrategyOutcome};
use crate::mixture::block::DataBlock;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::algorithm::{AlgorithmKind, AlgorithmOptions};
use crate::mixture::traits::density::{MixtureRng, ModelId};
use crate::mixture::traits::mixture::{CandidateScore, MixtureOptions, SelectionOptions};
use std::cmp::Ordering;
use tracing::{info, warn};

/// A data block and the family that models it.
#[derive(Debug, Clone)]
pub struct HostBlock {
    /// Family.
    pub model: ModelId,
    /// Host copy of the data.
    pub data: DataBlock,
}

/// Best candidate of a selection.
#[derive(Debug, Clone)]
pub struct SelectionOutcome {
    /// Strategy result of the winner.
    pub best: StrategyOutcome,
    /// Families of the winner, one per block.
    pub models: Vec<ModelId>,
    /// Criterion value of the winner.
    pub criterion_value: f64,
    /// Every candidate, best first, failed ones last.
    pub candidates: Vec<CandidateScore>,
}

fn validate_algorithm(algo: &AlgorithmOptions, name: &str) -> MixtureResult<()> {
    if algo.max_iter == 0 {
        return Err(MixtureError::InvalidParameter {
            parameter: format!("{name}.max_iter"),
            message: "must be > 0".to_string(),
        });
    }
    if algo.kind.is_stochastic() && algo.burn_in >= algo.max_iter {
        return Err(MixtureError::InvalidParameter {
            parameter: format!("{name}.burn_in"),
            message: format!(
                "burn_in={} leaves no iteration to average before max_iter={}",
                algo.burn_in, algo.max_iter
            ),
        });
    }
    if let Some(eps) = algo.epsilon {
        if !(eps > 0.0 && eps.is_finite()) {
            return Err(MixtureError::InvalidParameter {
                parameter: format!("{name}.epsilon"),
                message: format!("must be finite and > 0, got {eps}"),
            });
        }
    }
    Ok(())
}

/// Check option consistency before any estimation work.
pub fn validate_options(options: &MixtureOptions) -> MixtureResult<()> {
    let strategy = &options.strategy;
    validate_algorithm(&strategy.long_algo, "long_algo")?;
    if let Some(short) = &strategy.short_algo {
        validate_algorithm(short, "short_algo")?;
    }
    let semi = [Some(&strategy.long_algo), strategy.short_algo.as_ref()]
        .into_iter()
        .flatten()
        .any(|a| a.kind == AlgorithmKind::SemiSupervised);
    if semi && options.known_labels.is_none() {
        return Err(MixtureError::InvalidParameter {
            parameter: "known_labels".to_string(),
            message: "semi-supervised estimation needs known labels".to_string(),
        });
    }
    Ok(())
}

/// Composer with one bridge per block, not yet initialized.
pub fn build_composer(
    registry: &ModelRegistry,
    blocks: &[HostBlock],
    options: &MixtureOptions,
) -> MixtureResult<Composer> {
    let n_sample = blocks
        .first()
        .map(|b| b.data.n_rows())
        .ok_or_else(|| MixtureError::InvalidParameter {
            parameter: "blocks".to_string(),
            message: "at least one block is required".to_string(),
        })?;
    let mut composer = Composer::new(n_sample, options.n_cluster)?;
    composer.set_proportions(options.proportions);
    for block in blocks {
        composer.create_mixture(registry, block.model, block.data.clone())?;
    }
    if let Some(labels) = &options.known_labels {
        composer.set_known_labels(labels.clone())?;
    }
    Ok(composer)
}

/// Fit one mixture with `options.n_cluster` clusters.
pub fn fit_blocks(
    registry: &ModelRegistry,
    blocks: &[HostBlock],
    options: &MixtureOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<StrategyOutcome> {
    validate_options(options)?;
    let prototype = build_composer(registry, blocks, options)?;
    run_strategy(&prototype, &options.strategy, rng)
}

/// Fit every (families, K) candidate and keep the lowest criterion.
///
/// A failing candidate is recorded with its error and does not stop the
/// search. When no candidate succeeds the result is `EstimFail` listing
/// every failure.
pub fn select_blocks(
    registry: &ModelRegistry,
    blocks: &[HostBlock],
    options: &SelectionOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<SelectionOutcome> {
    if options.n_clusters.is_empty() {
        return Err(MixtureError::InvalidParameter {
            parameter: "n_clusters".to_string(),
            message: "at least one cluster count is required".to_string(),
        });
    }
    let model_sets = if options.model_sets.is_empty() {
        vec![blocks.iter().map(|b| b.model).collect::<Vec<_>>()]
    } else {
        options.model_sets.clone()
    };
    if let Some(bad) = model_sets.iter().find(|set| set.len() != blocks.len()) {
        return Err(MixtureError::ShapeMismatch {
            expected: blocks.len(),
            got: bad.len(),
            context: "models per candidate".to_string(),
        });
    }

    let mut best: Option<(StrategyOutcome, Vec<ModelId>, f64)> = None;
    let mut candidates = Vec::with_capacity(model_sets.len() * options.n_clusters.len());

    for models in &model_sets {
        let candidate_blocks: Vec<HostBlock> = blocks
            .iter()
            .zip(models)
            .map(|(b, &model)| HostBlock {
                model,
                data: b.data.clone(),
            })
            .collect();
        for &n_cluster in &options.n_clusters {
            let candidate_options = MixtureOptions {
                n_cluster,
                criterion: options.criterion,
                ..options.base.clone()
            };
            match fit_blocks(registry, &candidate_blocks, &candidate_options, rng) {
                Ok(outcome) => {
                    let value = composer_criterion(options.criterion, &outcome.composer);
                    info!(?models, n_cluster, criterion = value, "candidate fitted");
                    candidates.push(CandidateScore {
                        models: models.clone(),
                        n_cluster,
                        criterion_value: Some(value),
                        error: None,
                    });
                    let better = best.as_ref().map_or(true, |(_, _, b)| value < *b);
                    if better {
                        best = Some((outcome, models.clone(), value));
                    }
                }
                Err(err) => {
                    warn!(?models, n_cluster, kind = err.kind(), "candidate failed");
                    candidates.push(CandidateScore {
                        models: models.clone(),
                        n_cluster,
                        criterion_value: None,
                        error: Some(err.to_string()),
                    });
                }
            }
        }
    }

    candidates.sort_by(|a, b| match (a.criterion_value, b.criterion_value) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });

    match best {
        Some((best, models, criterion_value)) => Ok(SelectionOutcome {
            best,
            models,
            criterion_value,
            candidates,
        }),
        None => Err(MixtureError::EstimFail {
            context: format!(
                "no candidate converged: {}",
                candidates
                    .iter()
                    .map(|c| format!(
                        "{:?} K={}: {}",
                        c.models,
                        c.n_cluster,
                        c.error.as_deref().unwrap_or("")
                    ))
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::impl_generic::test_support::two_cluster_data;
    use crate::mixture::traits::criterion::CriterionKind;
    use crate::mixture::traits::strategy::{InitMethod, StrategyOptions};
    use rand::SeedableRng;

    fn blocks() -> Vec<HostBlock> {
        vec![HostBlock {
            model: ModelId::GaussianSjk,
            data: two_cluster_data(120, 31),
        }]
    }

    fn base() -> MixtureOptions {
        MixtureOptions {
            strategy: StrategyOptions {
                nb_try: 2,
                nb_init_run: 3,
                ..StrategyOptions::default()
            },
            ..MixtureOptions::default()
        }
    }

    #[test]
    fn test_bic_selects_true_cluster_count() {
        let options = SelectionOptions {
            n_clusters: vec![1, 2, 3],
            base: base(),
            ..SelectionOptions::default()
        };
        let mut rng = MixtureRng::seed_from_u64(3);
        let outcome =
            select_blocks(&ModelRegistry::with_defaults(), &blocks(), &options, &mut rng).unwrap();
        assert_eq!(outcome.best.composer.n_cluster(), 2);
        assert_eq!(outcome.candidates.len(), 3);
        assert_eq!(outcome.candidates[0].n_cluster, 2);
        assert_eq!(outcome.candidates[0].criterion_value, Some(outcome.criterion_value));
    }

    #[test]
    fn test_failed_candidates_recorded() {
        let options = SelectionOptions {
            n_clusters: vec![2],
            model_sets: vec![vec![ModelId::PoissonLjk], vec![ModelId::GaussianS]],
            criterion: CriterionKind::Icl,
            base: base(),
        };
        let mut rng = MixtureRng::seed_from_u64(3);
        let outcome =
            select_blocks(&ModelRegistry::with_defaults(), &blocks(), &options, &mut rng).unwrap();
        assert_eq!(outcome.models, vec![ModelId::GaussianS]);
        let failed = outcome.candidates.last().unwrap();
        assert_eq!(failed.models, vec![ModelId::PoissonLjk]);
        assert!(failed.criterion_value.is_none());
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_no_candidate_converges() {
        let options = SelectionOptions {
            n_clusters: vec![2, 3],
            model_sets: vec![vec![ModelId::CategoricalPjk]],
            base: base(),
            ..SelectionOptions::default()
        };
        let mut rng = MixtureRng::seed_from_u64(3);
        let err = select_blocks(&ModelRegistry::with_defaults(), &blocks(), &options, &mut rng)
            .unwrap_err();
        assert_eq!(err.kind(), "estimFail");
        assert!(err.to_string().contains("K=3"));
    }

    #[test]
    fn test_semi_supervised_needs_labels() {
        let mut options = base();
        options.strategy =
            StrategyOptions::simple(1, InitMethod::RandomParams, AlgorithmOptions {
                kind: AlgorithmKind::SemiSupervised,
                ..AlgorithmOptions::default()
            });
        assert!(validate_options(&options).is_err());
        options.known_labels = Some(vec![None; 120]);
        assert!(validate_options(&options).is_ok());
    }

    #[test]
    fn test_sem_burn_in_must_leave_iterations() {
        let mut options = base();
        options.strategy.long_algo = AlgorithmOptions {
            kind: AlgorithmKind::Sem,
            max_iter: 10,
            epsilon: None,
            burn_in: 10,
        };
        let err = validate_options(&options).unwrap_err();
        assert_eq!(err.kind(), "invalidParameter");
        assert!(err.to_string().contains("long_algo.burn_in"));

        options.strategy.long_algo.burn_in = 9;
        assert!(validate_options(&options).is_ok());

        // A non-stochastic run ignores burn_in.
        options.strategy.long_algo.kind = AlgorithmKind::Em;
        options.strategy.long_algo.burn_in = 50;
        assert!(validate_options(&options).is_ok());
    }

    #[test]
    fn test_out_of_range_cluster_count_recorded() {
        let options = SelectionOptions {
            n_clusters: vec![2, 500],
            base: base(),
            ..SelectionOptions::default()
        };
        let mut rng = MixtureRng::seed_from_u64(3);
        let outcome =
            select_blocks(&ModelRegistry::with_defaults(), &blocks(), &options, &mut rng).unwrap();
        assert_eq!(outcome.best.composer.n_cluster(), 2);
        let failed = outcome.candidates.last().unwrap();
        assert_eq!(failed.n_cluster, 500);
        assert!(failed.criterion_value.is_none());
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_model_set_width_checked() {
        let options = SelectionOptions {
            model_sets: vec![vec![ModelId::GaussianS, ModelId::GaussianSk]],
            ..SelectionOptions::default()
        };
        let mut rng = MixtureRng::seed_from_u64(3);
        let err = select_blocks(&ModelRegistry::with_defaults(), &blocks(), &options, &mut rng)
            .unwrap_err();
        assert_eq!(err.kind(), "shapeMismatch");
    }
}
