//! Estimation algorithm options.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// EM-family variant run by one convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AlgorithmKind {
    /// Expectation-Maximization.
    #[default]
    Em,
    /// Classification EM: hard assignment before each M-step.
    Cem,
    /// Stochastic EM: labels drawn from the posterior before each M-step,
    /// parameters averaged over the post burn-in iterations.
    Sem,
    /// EM with known labels held fixed for the labelled samples.
    SemiSupervised,
}

impl AlgorithmKind {
    /// Whether iterations are noisy and parameters must be averaged.
    pub fn is_stochastic(&self) -> bool {
        matches!(self, Self::Sem)
    }
}

/// Options for one convergence loop.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AlgorithmOptions {
    /// Variant.
    pub kind: AlgorithmKind,
    /// Iteration cap.
    pub max_iter: usize,
    /// Stop when the log-likelihood moves less than this. `None` runs to the
    /// cap. Ignored by SEM, which always runs to the cap.
    pub epsilon: Option<f64>,
    /// SEM iterations discarded before parameters are averaged.
    pub burn_in: usize,
}

impl Default for AlgorithmOptions {
    fn default() -> Self {
        Self {
            kind: AlgorithmKind::Em,
            max_iter: 200,
            epsilon: Some(1e-8),
            burn_in: 0,
        }
    }
}

impl AlgorithmOptions {
    /// Short exploratory run used to pick among initializations.
    pub fn short_run(kind: AlgorithmKind) -> Self {
        Self {
            kind,
            max_iter: 20,
            epsilon: Some(1e-4),
            burn_in: 0,
        }
    }
}
