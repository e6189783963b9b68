//! Penalized-likelihood criteria. Lower is better.

use super::composer::Composer;
use crate::mixture::traits::criterion::CriterionKind;

/// Akaike information criterion: `-2 ll + 2 p`.
pub fn aic(ln_likelihood: f64, n_free_parameters: usize) -> f64 {
    -2.0 * ln_likelihood + 2.0 * n_free_parameters as f64
}

/// Bayesian information criterion: `-2 ll + p ln(n)`.
pub fn bic(ln_likelihood: f64, n_free_parameters: usize, n_sample: usize) -> f64 {
    -2.0 * ln_likelihood + n_free_parameters as f64 * (n_sample as f64).ln()
}

/// Integrated completed likelihood: BIC plus twice the classification
/// entropy `-Σ tik ln tik`.
pub fn icl(ln_likelihood: f64, n_free_parameters: usize, n_sample: usize, entropy: f64) -> f64 {
    bic(ln_likelihood, n_free_parameters, n_sample) + 2.0 * entropy
}

/// Criterion of a finalized composer.
pub fn composer_criterion(kind: CriterionKind, composer: &Composer) -> f64 {
    let ll = composer.ln_likelihood();
    let p = composer.nb_free_parameters();
    let n = composer.n_sample();
    match kind {
        CriterionKind::Aic => aic(ll, p),
        CriterionKind::Bic => bic(ll, p, n),
        CriterionKind::Icl => icl(ll, p, n, composer.entropy()),
    }
}
