//! Model selection criteria.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Penalized-likelihood score. Lower is better for every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CriterionKind {
    /// Akaike: `-2 ll + 2 p`.
    Aic,
    /// Bayesian: `-2 ll + p ln(n)`.
    #[default]
    Bic,
    /// Integrated completed likelihood: BIC plus the classification
    /// entropy `-2 Σ tik ln(tik)`.
    Icl,
}
