//! Multi-trial search over starting points.

use super::algorithm::{run_algorithm, AlgorithmRun};
use super::composer::{Composer, ComposerState};
use super::init::initialize_parameters;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::MixtureRng;
use crate::mixture::traits::strategy::{InitMethod, StrategyOptions};
use tracing::{debug, info, warn};

/// Best composer found by a strategy.
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    /// Finalized composer of the best attempt.
    pub composer: Composer,
    /// Long run of the best attempt.
    pub run: AlgorithmRun,
    /// Attempts that failed.
    pub n_failed: usize,
    /// One line per failed attempt.
    pub diagnostics: Vec<String>,
}

/// Run `nb_try` attempts from clones of `prototype` and keep the one with
/// the highest final log-likelihood.
///
/// Each attempt draws `nb_init_run` starting points, refines each with the
/// short run (when configured) and keeps the one with the highest
/// log-likelihood; the survivor gets the long run and is finalized. A trial
/// failure discards the attempt and the next one starts from a fresh draw.
/// Setup errors are returned immediately. When every attempt fails the
/// result is `EstimFail` carrying the accumulated diagnostics.
///
/// A prototype still in the `Created` state is initialized in each clone.
/// One already initialized keeps its parameters, which is what
/// [`InitMethod::Parameters`] starts from; that method is rejected on a
/// `Created` prototype since there are no parameters to start from.
pub fn run_strategy(
    prototype: &Composer,
    options: &StrategyOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<StrategyOutcome> {
    if options.nb_try == 0 {
        return Err(MixtureError::InvalidParameter {
            parameter: "nb_try".to_string(),
            message: "must be > 0".to_string(),
        });
    }
    if options.nb_init_run == 0 {
        return Err(MixtureError::InvalidParameter {
            parameter: "nb_init_run".to_string(),
            message: "must be > 0".to_string(),
        });
    }
    if options.init == InitMethod::Parameters && prototype.state() == ComposerState::Created {
        return Err(MixtureError::InvalidParameter {
            parameter: "init".to_string(),
            message: "Parameters needs a composer that already holds parameters".to_string(),
        });
    }

    let mut best: Option<(Composer, AlgorithmRun)> = None;
    let mut diagnostics = Vec::new();

    for attempt in 1..=options.nb_try {
        match run_attempt(prototype, options, rng) {
            Ok((composer, run)) => {
                debug!(attempt, ln_likelihood = run.ln_likelihood, "attempt succeeded");
                let better = best
                    .as_ref()
                    .map_or(true, |(_, b)| run.ln_likelihood > b.ln_likelihood);
                if better {
                    best = Some((composer, run));
                }
            }
            Err(err) if err.is_trial_failure() => {
                warn!(attempt, kind = err.kind(), error = %err, "attempt failed");
                diagnostics.push(format!("attempt {attempt}: {}: {err}", err.kind()));
            }
            Err(err) => return Err(err),
        }
    }

    let n_failed = diagnostics.len();
    match best {
        Some((composer, run)) => {
            info!(
                n_failed,
                ln_likelihood = run.ln_likelihood,
                n_iter = run.n_iter,
                "strategy finished"
            );
            Ok(StrategyOutcome {
                composer,
                run,
                n_failed,
                diagnostics,
            })
        }
        None => Err(MixtureError::EstimFail {
            context: format!(
                "all {} attempts failed: {}",
                options.nb_try,
                diagnostics.join("; ")
            ),
        }),
    }
}

fn run_attempt(
    prototype: &Composer,
    options: &StrategyOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<(Composer, AlgorithmRun)> {
    let mut survivor: Option<(Composer, f64)> = None;
    let mut last_err = None;

    for init_run in 0..options.nb_init_run {
        let mut candidate = prototype.clone();
        match start_candidate(&mut candidate, options, rng) {
            Ok(ll) => {
                let better = survivor.as_ref().map_or(true, |(_, b)| ll > *b);
                if better {
                    survivor = Some((candidate, ll));
                }
            }
            Err(err) if err.is_trial_failure() => {
                debug!(init_run, kind = err.kind(), "initialization discarded");
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }

    let Some((mut composer, _)) = survivor else {
        return Err(last_err.unwrap_or_else(|| MixtureError::EstimFail {
            context: "no initialization survived".to_string(),
        }));
    };
    let mut run = run_algorithm(&mut composer, &options.long_algo, rng)?;
    run.ln_likelihood = composer.finalize_step()?;
    Ok((composer, run))
}

/// Initialize one candidate and score it after the short run.
fn start_candidate(
    candidate: &mut Composer,
    options: &StrategyOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<f64> {
    if candidate.state() == ComposerState::Created {
        candidate.initialize_step()?;
    }
    initialize_parameters(candidate, options.init, rng)?;
    match &options.short_algo {
        Some(short) => run_algorithm(candidate, short, rng).map(|r| r.ln_likelihood),
        None => candidate.compute_ln_likelihood(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::impl_generic::bridge::Bridge;
    use crate::mixture::impl_generic::test_support::{
        gaussian_composer, two_cluster_data, FlakyModel,
    };
    use crate::mixture::traits::algorithm::AlgorithmOptions;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn flaky_composer(failures: usize) -> (Composer, Arc<AtomicUsize>) {
        let data = two_cluster_data(80, 13);
        let (model, calls) = FlakyModel::new(2, failures);
        let mut composer = Composer::new(data.n_rows(), 2).unwrap();
        composer
            .register_bridge(Bridge::new(Box::new(model), data))
            .unwrap();
        (composer, calls)
    }

    #[test]
    fn test_retry_bound_exercised_exactly() {
        let nb_try = 4;
        let (prototype, calls) = flaky_composer(nb_try - 1);
        let options = StrategyOptions::simple(
            nb_try,
            InitMethod::RandomParams,
            AlgorithmOptions::default(),
        );
        let mut rng = MixtureRng::seed_from_u64(1);
        let outcome = run_strategy(&prototype, &options, &mut rng).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), nb_try);
        assert_eq!(outcome.n_failed, nb_try - 1);
        assert_eq!(outcome.diagnostics.len(), nb_try - 1);
        assert!(outcome.diagnostics[0].contains("randomInitFail"));
        assert_eq!(outcome.composer.state(), ComposerState::Finalized);
        assert!(outcome.run.ln_likelihood.is_finite());
    }

    #[test]
    fn test_every_attempt_failing_reports_estim_fail() {
        let (prototype, calls) = flaky_composer(usize::MAX);
        let options =
            StrategyOptions::simple(3, InitMethod::RandomParams, AlgorithmOptions::default());
        let mut rng = MixtureRng::seed_from_u64(1);
        let err = run_strategy(&prototype, &options, &mut rng).unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.kind(), "estimFail");
        assert!(err.to_string().contains("attempt 3: randomInitFail"));
    }

    #[test]
    fn test_two_phase_keeps_best_likelihood() {
        let prototype = gaussian_composer(&two_cluster_data(100, 17), 2);
        let options = StrategyOptions {
            nb_try: 2,
            nb_init_run: 4,
            ..StrategyOptions::default()
        };
        let mut rng = MixtureRng::seed_from_u64(8);
        let outcome = run_strategy(&prototype, &options, &mut rng).unwrap();
        assert_eq!(outcome.n_failed, 0);
        assert_eq!(outcome.composer.ln_likelihood(), outcome.run.ln_likelihood);
    }

    #[test]
    fn test_parameters_init_needs_parameters() {
        let prototype = gaussian_composer(&two_cluster_data(100, 17), 2);
        let options =
            StrategyOptions::simple(1, InitMethod::Parameters, AlgorithmOptions::default());
        let mut rng = MixtureRng::seed_from_u64(8);
        let err = run_strategy(&prototype, &options, &mut rng).unwrap_err();
        assert_eq!(err.kind(), "invalidParameter");
        assert!(err.to_string().contains("init"));
    }

    #[test]
    fn test_finalized_composer_seeds_new_run() {
        let prototype = gaussian_composer(&two_cluster_data(100, 17), 2);
        let mut rng = MixtureRng::seed_from_u64(8);
        let first = run_strategy(
            &prototype,
            &StrategyOptions::simple(2, InitMethod::RandomParams, AlgorithmOptions::default()),
            &mut rng,
        )
        .unwrap();
        assert_eq!(first.composer.state(), ComposerState::Finalized);

        let reuse = StrategyOptions::simple(1, InitMethod::Parameters, AlgorithmOptions::default());
        let second = run_strategy(&first.composer, &reuse, &mut rng).unwrap();
        assert!(second.run.n_iter <= 2, "took {} iterations", second.run.n_iter);
        let gap = (second.run.ln_likelihood - first.run.ln_likelihood).abs();
        assert!(gap < 1e-6, "gap {gap}");
        for (a, b) in second.composer.pk().iter().zip(first.composer.pk()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let prototype = gaussian_composer(&two_cluster_data(10, 1), 2);
        let mut rng = MixtureRng::seed_from_u64(8);
        let options = StrategyOptions {
            nb_try: 0,
            ..StrategyOptions::default()
        };
        assert_eq!(
            run_strategy(&prototype, &options, &mut rng).unwrap_err().kind(),
            "invalidParameter"
        );
    }
}
