//! Multi-trial strategy options.

use super::algorithm::{AlgorithmKind, AlgorithmOptions};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a trial's starting point is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum InitMethod {
    /// Each block draws random parameters, then one E-step.
    #[default]
    RandomParams,
    /// Random hard labels (every cluster non-empty), then one M-step.
    RandomClass,
    /// Random fuzzy responsibilities, then one M-step.
    RandomFuzzy,
    /// Keep the parameters already held by the composer (set by the host or
    /// left by a previous run), then one E-step.
    Parameters,
}

/// Options for the multi-trial search.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StrategyOptions {
    /// Total attempts, failed ones included.
    pub nb_try: usize,
    /// Initializations per attempt; the best after its short run survives.
    pub nb_init_run: usize,
    /// Initialization method.
    pub init: InitMethod,
    /// Short run applied to each initialization. `None` skips the short
    /// phase and every initialization is scored as is.
    pub short_algo: Option<AlgorithmOptions>,
    /// Long run applied to the survivor.
    pub long_algo: AlgorithmOptions,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        Self {
            nb_try: 3,
            nb_init_run: 5,
            init: InitMethod::RandomParams,
            short_algo: Some(AlgorithmOptions::short_run(AlgorithmKind::Em)),
            long_algo: AlgorithmOptions::default(),
        }
    }
}

impl StrategyOptions {
    /// One initialization per attempt, no short phase.
    pub fn simple(nb_try: usize, init: InitMethod, algo: AlgorithmOptions) -> Self {
        Self {
            nb_try,
            nb_init_run: 1,
            init,
            short_algo: None,
            long_algo: algo,
        }
    }
}
