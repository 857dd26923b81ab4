//! Error type for settlement proof generation.

use thiserror::Error;

use crate::error::NameServiceError;

/// Errors from [`SettlementProofGenerator`](super::SettlementProofGenerator).
///
/// None of these leave anything behind: no snapshot is staged and the
/// action log is untouched, so the next cycle can simply try again.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Nothing pending. Not a failure, but there is nothing to prove.
    #[error("no pending actions to settle")]
    EmptyBatch,

    /// The proof capability failed or is unavailable.
    #[error("proof construction failed: {0}")]
    ProofConstructionFailed(String),
}

impl From<SettlementError> for NameServiceError {
    fn from(e: SettlementError) -> Self {
        NameServiceError::ProofConstructionFailed(e.to_string())
    }
}
