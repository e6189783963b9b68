//! Starting points for an estimation run.

use super::composer::{Composer, ComposerState};
use crate::mixture::error::{MixtureError, MixtureResult};
use crate::mixture::traits::density::MixtureRng;
use crate::mixture::traits::strategy::InitMethod;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Exp1};

/// Put an initialized composer at a starting point.
///
/// Random parameter draws that fail are forwarded unmodified; a failure of
/// the step that follows a random draw is reported as the init method's own
/// failure kind.
pub fn initialize_parameters(
    composer: &mut Composer,
    method: InitMethod,
    rng: &mut MixtureRng,
) -> MixtureResult<()> {
    match method {
        InitMethod::RandomParams => {
            composer.random_init(rng)?;
            composer.mark_param_initialized();
            composer
                .e_step()
                .map_err(|e| MixtureError::RandomParamInitFail {
                    context: e.to_string(),
                })
        }
        InitMethod::RandomClass => {
            let tik = random_classes(composer.n_sample(), composer.n_cluster(), rng);
            composer.set_tik(tik);
            composer
                .m_step()
                .map_err(|e| MixtureError::RandomClassInitFail {
                    context: e.to_string(),
                })?;
            composer.mark_param_initialized();
            Ok(())
        }
        InitMethod::RandomFuzzy => {
            let tik = random_fuzzy(composer.n_sample(), composer.n_cluster(), rng);
            composer.set_tik(tik);
            composer
                .m_step()
                .map_err(|e| MixtureError::RandomFuzzyInitFail {
                    context: e.to_string(),
                })?;
            composer.mark_param_initialized();
            Ok(())
        }
        InitMethod::Parameters => {
            if composer.state() == ComposerState::Created {
                return Err(MixtureError::InvalidParameter {
                    parameter: "init".to_string(),
                    message: "composer holds no parameters yet".to_string(),
                });
            }
            composer.mark_param_initialized();
            composer.e_step()
        }
    }
}

/// One-hot rows with every cluster used at least once.
fn random_classes(n: usize, k: usize, rng: &mut MixtureRng) -> Vec<f64> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut tik = vec![0.0; n * k];
    for (rank, &i) in order.iter().enumerate() {
        let z = if rank < k { rank } else { rng.gen_range(0..k) };
        tik[i * k + z] = 1.0;
    }
    tik
}

/// Rows drawn uniformly from the simplex.
fn random_fuzzy(n: usize, k: usize, rng: &mut MixtureRng) -> Vec<f64> {
    let mut tik: Vec<f64> = (0..n * k).map(|_| Exp1.sample(rng)).collect();
    for row in tik.chunks_mut(k) {
        let total: f64 = row.iter().sum();
        row.iter_mut().for_each(|t| *t /= total);
    }
    tik
}
