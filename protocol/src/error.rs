//! The public error taxonomy of the name service.
//!
//! Subsystems have their own error enums ([`RuleError`], [`LogError`],
//! [`StoreError`], ...). This is what crosses the contract boundary to a
//! client, so every variant is something a caller can act on.

use thiserror::Error;

use crate::rules::RuleError;
use crate::storage::state::StateRoot;

/// Errors returned by the settlement contract interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameServiceError {
    /// `register` for a name that is already in the committed state.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// The name is not in the committed state.
    #[error("not found: {0}")]
    NotFound(String),

    /// The submitter does not own the name it tried to modify.
    #[error("not owner: {0}")]
    NotOwner(String),

    /// An administrative action from someone other than the administrator.
    #[error("not admin: {0}")]
    NotAdmin(String),

    /// The proof was built on a root that has since advanced. Regenerate.
    #[error("stale root: proof starts at {expected}, committed root is {actual}")]
    StaleRoot {
        /// Old root the proof was built against.
        expected: StateRoot,
        /// The root actually committed.
        actual: StateRoot,
    },

    /// The proof capability failed. Nothing was mutated.
    #[error("proof construction failed: {0}")]
    ProofConstructionFailed(String),

    /// The ledger refused the transaction (bad signature, duplicate, log
    /// full). Not retried automatically.
    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    /// The proof did not verify, or it does not describe the pending log.
    #[error("invalid settlement proof: {0}")]
    InvalidProof(String),

    /// Persistence failed. Nothing was mutated.
    #[error("storage error: {0}")]
    Storage(String),
}

impl NameServiceError {
    /// Stable machine-readable name, used as the API error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered(_) => "AlreadyRegistered",
            Self::NotFound(_) => "NotFound",
            Self::NotOwner(_) => "NotOwner",
            Self::NotAdmin(_) => "NotAdmin",
            Self::StaleRoot { .. } => "StaleRoot",
            Self::ProofConstructionFailed(_) => "ProofConstructionFailed",
            Self::SubmissionRejected(_) => "SubmissionRejected",
            Self::InvalidProof(_) => "InvalidProof",
            Self::Storage(_) => "Storage",
        }
    }

    /// `true` for rejections a client caused and can fix.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered(_)
                | Self::NotFound(_)
                | Self::NotOwner(_)
                | Self::NotAdmin(_)
                | Self::SubmissionRejected(_)
        )
    }
}

impl From<RuleError> for NameServiceError {
    fn from(e: RuleError) -> Self {
        let message = e.to_string();
        match e {
            RuleError::AlreadyRegistered(_) => Self::AlreadyRegistered(message),
            RuleError::NotFound(_) => Self::NotFound(message),
            RuleError::NotOwner { .. } => Self::NotOwner(message),
            RuleError::NotAdmin(_) => Self::NotAdmin(message),
        }
    }
}
