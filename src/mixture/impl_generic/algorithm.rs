//! One convergence loop over a composer.

use super::composer::Composer;
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::algorithm::{AlgorithmKind, AlgorithmOptions};
use crate::mixture::traits::density::MixtureRng;
use tracing::{debug, trace};

/// Summary of one loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AlgorithmRun {
    /// Iterations performed.
    pub n_iter: usize,
    /// Whether the tolerance was met before the cap.
    pub converged: bool,
    /// Log-likelihood at the end of the loop.
    pub ln_likelihood: f64,
    /// Log-likelihood after each iteration.
    pub history: Vec<f64>,
}

/// Iterate E, (impute | sample), (C | S), M until the log-likelihood moves
/// less than `epsilon` or `max_iter` is reached.
///
/// Missing cells are refreshed right after the E-step so that the M-step
/// sees values consistent with the current posterior. SEM runs to the cap,
/// averages the parameters of the iterations after `burn_in` and adopts the
/// average at the end, so it needs `burn_in < max_iter`. The first failing
/// step ends the loop with its error.
pub fn run_algorithm(
    composer: &mut Composer,
    options: &AlgorithmOptions,
    rng: &mut MixtureRng,
) -> MixtureResult<AlgorithmRun> {
    let stochastic = options.kind.is_stochastic();
    if stochastic && options.burn_in >= options.max_iter {
        return Err(MixtureError::InvalidParameter {
            parameter: "burn_in".to_string(),
            message: format!(
                "burn_in={} leaves no iteration to average before max_iter={}",
                options.burn_in, options.max_iter
            ),
        });
    }
    let epsilon = if stochastic { None } else { options.epsilon };

    let mut prev = composer.compute_ln_likelihood()?;
    let mut history = Vec::with_capacity(options.max_iter);
    let mut n_iter = 0;
    let mut converged = false;

    for iter in 1..=options.max_iter {
        composer.e_step()?;
        match options.kind {
            AlgorithmKind::Sem => composer.sampling_step(rng),
            _ => composer.imputation_step(),
        }
        match options.kind {
            AlgorithmKind::Cem => composer.c_step()?,
            AlgorithmKind::Sem => composer.s_step(rng)?,
            AlgorithmKind::Em | AlgorithmKind::SemiSupervised => {}
        }
        composer.m_step()?;
        if stochastic && iter > options.burn_in {
            composer.store_intermediate_results()?;
        }

        let ll = composer.compute_ln_likelihood()?;
        trace!(iter, ll, "mixture iteration");
        history.push(ll);
        n_iter = iter;

        if let Some(eps) = epsilon {
            if (ll - prev).abs() < eps {
                converged = true;
                break;
            }
        }
        prev = ll;
    }

    if stochastic {
        composer.set_parameters_step()?;
        composer.e_step()?;
    }
    let ln_likelihood = composer.compute_ln_likelihood()?;

    debug!(
        kind = ?options.kind,
        n_iter,
        converged,
        ln_likelihood,
        "mixture algorithm finished"
    );
    Ok(AlgorithmRun {
        n_iter,
        converged,
        ln_likelihood,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixture::block::DataBlock;
    use crate::mixture::impl_generic::composer::ComposerState;
    use crate::mixture::impl_generic::init::initialize_parameters;
    use crate::mixture::impl_generic::test_support::{
        gaussian_composer, two_cluster_data, two_cluster_values,
    };
    use crate::mixture::traits::strategy::InitMethod;
    use rand::SeedableRng;

    fn started(seed: u64) -> (Composer, MixtureRng) {
        let mut composer = gaussian_composer(&two_cluster_data(120, 21), 2);
        composer.initialize_step().unwrap();
        let mut rng = MixtureRng::seed_from_u64(seed);
        initialize_parameters(&mut composer, InitMethod::RandomParams, &mut rng).unwrap();
        (composer, rng)
    }

    #[test]
    fn test_em_likelihood_non_decreasing() {
        let (mut composer, mut rng) = started(1);
        let options = AlgorithmOptions {
            kind: AlgorithmKind::Em,
            max_iter: 100,
            epsilon: None,
            burn_in: 0,
        };
        let run = run_algorithm(&mut composer, &options, &mut rng).unwrap();
        assert_eq!(run.n_iter, 100);
        for pair in run.history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-6, "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_em_converges_before_cap() {
        let (mut composer, mut rng) = started(2);
        let run = run_algorithm(&mut composer, &AlgorithmOptions::default(), &mut rng).unwrap();
        assert!(run.converged);
        assert!(run.n_iter < 200);
        assert_eq!(run.ln_likelihood, composer.ln_likelihood());
    }

    #[test]
    fn test_cem_ends_with_hard_partition() {
        let (mut composer, mut rng) = started(3);
        let options = AlgorithmOptions {
            kind: AlgorithmKind::Cem,
            ..AlgorithmOptions::default()
        };
        run_algorithm(&mut composer, &options, &mut rng).unwrap();
        // The loop ends on an M-step that followed a C-step.
        let total: f64 = composer.nk().iter().sum();
        assert!((total - composer.n_sample() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_sem_runs_to_cap_and_releases_accumulators() {
        let (mut composer, mut rng) = started(4);
        let options = AlgorithmOptions {
            kind: AlgorithmKind::Sem,
            max_iter: 30,
            epsilon: Some(1.0),
            burn_in: 10,
        };
        let run = run_algorithm(&mut composer, &options, &mut rng).unwrap();
        assert_eq!(run.n_iter, 30);
        assert!(!run.converged);
        assert!(composer.bridges().iter().all(|b| b.stored_count() == 0));
        let pk_sum: f64 = composer.pk().iter().sum();
        assert!((pk_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sem_without_averaged_iterations_rejected() {
        let (mut composer, mut rng) = started(6);
        let before = composer.pk().to_vec();
        let options = AlgorithmOptions {
            kind: AlgorithmKind::Sem,
            max_iter: 10,
            epsilon: None,
            burn_in: 10,
        };
        let err = run_algorithm(&mut composer, &options, &mut rng).unwrap_err();
        assert_eq!(err.kind(), "invalidParameter");
        assert!(!err.is_trial_failure());
        assert_eq!(composer.pk(), before.as_slice());
    }

    #[test]
    fn test_sem_samples_missing_cells() {
        let mut values = two_cluster_values(120, 21);
        let holes: Vec<(usize, usize)> =
            (0..120).step_by(8).map(|i| (i, (i / 8) % 2)).collect();
        for &(i, j) in &holes {
            values[i * 2 + j] = f64::NAN;
        }
        let data = DataBlock::new("x", 120, 2, values).unwrap();
        let mut composer = gaussian_composer(&data, 2);
        composer.initialize_step().unwrap();
        let mut rng = MixtureRng::seed_from_u64(7);
        initialize_parameters(&mut composer, InitMethod::RandomParams, &mut rng).unwrap();

        let options = AlgorithmOptions {
            kind: AlgorithmKind::Sem,
            max_iter: 40,
            epsilon: None,
            burn_in: 20,
        };
        let run = run_algorithm(&mut composer, &options, &mut rng).unwrap();
        assert!(run.ln_likelihood.is_finite());

        let cell = |c: &Composer, (i, j): (usize, usize)| c.block_data("x").unwrap().value(i, j);
        let drawn: Vec<f64> = holes.iter().map(|&h| cell(&composer, h)).collect();
        assert!(drawn.iter().all(|v| v.is_finite()));
        assert_eq!(composer.block_data("x").unwrap().missing(), holes.as_slice());

        // Every missing cell gets a fresh draw; observed cells never move.
        let observed = cell(&composer, (1, 0));
        composer.sampling_step(&mut rng);
        for (&h, &before) in holes.iter().zip(&drawn) {
            assert_ne!(cell(&composer, h), before, "cell {h:?} not redrawn");
        }
        assert_eq!(cell(&composer, (1, 0)), observed);

        // Imputation is a deterministic point estimate.
        composer.imputation_step();
        let first: Vec<f64> = holes.iter().map(|&h| cell(&composer, h)).collect();
        composer.imputation_step();
        let second: Vec<f64> = holes.iter().map(|&h| cell(&composer, h)).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_failure_stops_loop() {
        let (mut composer, mut rng) = started(5);
        // A uniform posterior puts every sample in cluster 0 after the C-step.
        composer.set_tik(vec![0.5; composer.n_sample() * 2]);
        composer.c_step().unwrap();
        let err = composer.m_step().unwrap_err();
        assert_eq!(err.kind(), "mStepFail");
        assert_eq!(composer.state(), ComposerState::Failed);
        assert!(run_algorithm(&mut composer, &AlgorithmOptions::default(), &mut rng).is_err());
    }
}
