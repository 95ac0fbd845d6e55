// =============================================================================
// Fusion Errors — hard, non-transient validation failures
// =============================================================================
//
// Every variant is raised at the first use of the offending evidence or
// distribution. Nothing here is retried: a bad input stays bad.

use thiserror::Error;

/// Result alias used throughout the fusion core.
pub type Result<T> = std::result::Result<T, FusionError>;

/// Error taxonomy for the fusion engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FusionError {
    /// A mass, likelihood, weight or probability lies outside [0, 1].
    #[error("invalid evidence '{source_name}': {reason}")]
    InvalidEvidence { source_name: String, reason: String },

    /// A prior, posterior or mass function does not sum to 1 within tolerance.
    #[error("invalid distribution '{name}': sums to {total:.6}, must be 1.0")]
    InvalidDistribution { name: String, total: f64 },

    /// Dempster's rule hit total conflict (K = 1); no combined belief exists.
    #[error("total conflict combining '{left}' with '{right}' (K = {conflict:.6})")]
    FusionConflict {
        left: String,
        right: String,
        conflict: f64,
    },

    /// Empty scenario set, duplicate ids, or a reference to an unknown scenario.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Engine configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// A strategy worker task panicked or was cancelled.
    #[error("strategy worker failed: {0}")]
    Worker(String),
}

impl FusionError {
    pub fn invalid_evidence(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEvidence {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_distribution(name: impl Into<String>, total: f64) -> Self {
        Self::InvalidDistribution {
            name: name.into(),
            total,
        }
    }

    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
