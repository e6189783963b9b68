//! Error types for mixture estimation.
//!
//! Errors split into two groups. Trial failures (`RandomInitFail` through
//! `EstimFail`) end the current estimation attempt and are caught by the
//! strategy, which retries with a fresh initialization. Setup errors
//! (invalid options, unknown blocks or models, shape mismatches) are returned
//! to the caller directly.

use thiserror::Error;

/// Result type for mixture operations.
pub type MixtureResult<T> = Result<T, MixtureError>;

/// Errors that can occur during mixture estimation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MixtureError {
    /// Generic random initialization failure.
    #[error("Random initialization failed: {context}")]
    RandomInitFail { context: String },

    /// Drawing random parameters failed.
    #[error("Random parameter initialization failed: {context}")]
    RandomParamInitFail { context: String },

    /// Drawing random hard labels (or the M-step that follows) failed.
    #[error("Random class initialization failed: {context}")]
    RandomClassInitFail { context: String },

    /// Drawing random fuzzy responsibilities (or the M-step that follows) failed.
    #[error("Random fuzzy initialization failed: {context}")]
    RandomFuzzyInitFail { context: String },

    /// A block could not compute its default parameters.
    #[error("Initialization step failed: {context}")]
    InitializeStepFail { context: String },

    /// No cluster has a finite log-probability for a sample.
    #[error("E-step failed at sample {sample}: {context}")]
    EStepFail { sample: usize, context: String },

    /// A density model could not re-estimate its parameters.
    #[error("M-step failed: {context}")]
    MStepFail { context: String },

    /// Hard assignment found a degenerate responsibility row.
    #[error("C-step failed at sample {sample}: degenerate responsibilities")]
    CStepFail { sample: usize },

    /// Stochastic assignment found a degenerate responsibility row.
    #[error("S-step failed at sample {sample}: degenerate responsibilities")]
    SStepFail { sample: usize },

    /// Estimation aborted (non-finite likelihood, or every trial failed).
    #[error("Estimation failed: {context}")]
    EstimFail { context: String },

    /// Invalid option or parameter value.
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Mismatched dimensions between blocks, labels or parameter arrays.
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    /// No block registered under this name.
    #[error("Unknown block '{name}'")]
    UnknownBlock { name: String },

    /// No constructor registered for this model identifier.
    #[error("Unknown model '{name}'")]
    UnknownModel { name: String },

    /// Error from underlying numr operation.
    #[error("numr error: {0}")]
    NumrError(String),
}

impl MixtureError {
    /// Whether this error ends a single estimation trial (and is retried by
    /// the strategy) rather than signalling a configuration problem.
    pub fn is_trial_failure(&self) -> bool {
        matches!(
            self,
            Self::RandomInitFail { .. }
                | Self::RandomParamInitFail { .. }
                | Self::RandomClassInitFail { .. }
                | Self::RandomFuzzyInitFail { .. }
                | Self::InitializeStepFail { .. }
                | Self::EStepFail { .. }
                | Self::MStepFail { .. }
                | Self::CStepFail { .. }
                | Self::SStepFail { .. }
                | Self::EstimFail { .. }
        )
    }

    /// Short name of the failure kind, used in strategy diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RandomInitFail { .. } => "randomInitFail",
            Self::RandomParamInitFail { .. } => "randomParamInitFail",
            Self::RandomClassInitFail { .. } => "randomClassInitFail",
            Self::RandomFuzzyInitFail { .. } => "randomFuzzyInitFail",
            Self::InitializeStepFail { .. } => "initializeStepFail",
            Self::EStepFail { .. } => "eStepFail",
            Self::MStepFail { .. } => "mStepFail",
            Self::CStepFail { .. } => "cStepFail",
            Self::SStepFail { .. } => "sStepFail",
            Self::EstimFail { .. } => "estimFail",
            Self::InvalidParameter { .. } => "invalidParameter",
            Self::ShapeMismatch { .. } => "shapeMismatch",
            Self::UnknownBlock { .. } => "unknownBlock",
            Self::UnknownModel { .. } => "unknownModel",
            Self::NumrError(_) => "numrError",
        }
    }
}

impl From<numr::error::Error> for MixtureError {
    fn from(err: numr::error::Error) -> Self {
        Self::NumrError(err.to_string())
    }
}

impl From<MixtureError> for numr::error::Error {
    fn from(err: MixtureError) -> Self {
        numr::error::Error::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MixtureError::MStepFail {
            context: "gaussian_sjk: zero weight in cluster 1".to_string(),
        };
        assert!(err.to_string().contains("M-step"));
        assert!(err.to_string().contains("cluster 1"));

        let err = MixtureError::EStepFail {
            sample: 17,
            context: "all log-probabilities non-finite".to_string(),
        };
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_trial_failure_classification() {
        assert!(MixtureError::CStepFail { sample: 0 }.is_trial_failure());
        assert!(
            MixtureError::EstimFail {
                context: String::new()
            }
            .is_trial_failure()
        );
        assert!(
            !MixtureError::UnknownBlock {
                name: "x".to_string()
            }
            .is_trial_failure()
        );
        assert_eq!(MixtureError::SStepFail { sample: 3 }.kind(), "sStepFail");
    }
}
