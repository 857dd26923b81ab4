//! Settlement artifacts: what the generator produces and the contract
//! consumes.
//!
//! A [`SettlementStatement`] is the public claim, "folding these actions, in
//! this order, takes the directory from `old_root` to `new_root`". The
//! [`Transcript`] is the generator's private record of how it got there,
//! one [`TranscriptStep`] per action. The proof bytes bind the two.

use serde::{Deserialize, Serialize};

use crate::actions::{ActionId, LoggedAction};
use crate::crypto::keys::Address;
use crate::rules::{Effect, RuleError};
use crate::storage::smt::MerkleProof;
use crate::storage::state::StateRoot;

/// A reference to one logged action by position and content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRef {
    pub seq: u64,
    pub digest: [u8; 32],
}

impl From<&LoggedAction> for ActionRef {
    fn from(action: &LoggedAction) -> Self {
        Self {
            seq: action.seq,
            digest: action.digest(),
        }
    }
}

/// The public statement a settlement proof attests to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStatement {
    pub old_root: StateRoot,
    pub new_root: StateRoot,
    /// The folded batch, in log order.
    pub actions: Vec<ActionRef>,
}

impl SettlementStatement {
    pub fn seqs(&self) -> Vec<u64> {
        self.actions.iter().map(|a| a.seq).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// What replay did with one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Applied(Effect),
    /// The rule rejected the action at its replay point. The action is still
    /// consumed by the settlement.
    Dropped(RuleError),
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// One replayed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptStep {
    pub seq: u64,
    pub id: ActionId,
    pub action_digest: [u8; 32],
    pub submitter: Address,
    pub pre_root: StateRoot,
    pub post_root: StateRoot,
    /// Inclusion or exclusion proof of the slot the rule read, against
    /// `pre_root`.
    pub read_proof: MerkleProof,
    pub outcome: StepOutcome,
}

/// Every read and write of one replay, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub old_root: StateRoot,
    pub steps: Vec<TranscriptStep>,
}

impl Transcript {
    pub fn new(old_root: StateRoot) -> Self {
        Self {
            old_root,
            steps: Vec::new(),
        }
    }

    /// Root after the last step.
    pub fn new_root(&self) -> StateRoot {
        self.steps
            .last()
            .map(|s| s.post_root)
            .unwrap_or(self.old_root)
    }

    /// `true` if the steps chain from `old_root` and every read proof
    /// verifies against its step's pre-state.
    pub fn is_consistent(&self) -> bool {
        let mut root = self.old_root;
        for step in &self.steps {
            if step.pre_root != root || !step.read_proof.verify(step.pre_root.as_bytes()) {
                return false;
            }
            if !step.outcome.is_applied() && step.post_root != step.pre_root {
                return false;
            }
            root = step.post_root;
        }
        true
    }
}

/// The artifact submitted to the settlement contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProof {
    pub statement: SettlementStatement,
    /// Replay outcome per action, aligned with `statement.actions`.
    pub outcomes: Vec<StepOutcome>,
    /// Opaque bytes from the proof system.
    pub proof: Vec<u8>,
}

impl SettlementProof {
    pub fn old_root(&self) -> StateRoot {
        self.statement.old_root
    }

    pub fn new_root(&self) -> StateRoot {
        self.statement.new_root
    }

    /// Actions the replay dropped, with the rule that rejected each.
    pub fn dropped(&self) -> Vec<DroppedAction> {
        self.statement
            .actions
            .iter()
            .zip(&self.outcomes)
            .filter_map(|(action, outcome)| match outcome {
                StepOutcome::Dropped(reason) => Some(DroppedAction {
                    seq: action.seq,
                    reason: reason.clone(),
                }),
                StepOutcome::Applied(_) => None,
            })
            .collect()
    }
}

/// An action that was consumed without effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedAction {
    pub seq: u64,
    pub reason: RuleError,
}

/// Returned by an accepted settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub old_root: StateRoot,
    pub new_root: StateRoot,
    /// Number of actions that changed state.
    pub applied: usize,
    pub dropped: Vec<DroppedAction>,
}

impl SettlementReceipt {
    /// Total actions retired by this settlement.
    pub fn retired(&self) -> usize {
        self.applied + self.dropped.len()
    }
}

/// Returned when a submission is accepted into the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub seq: u64,
    pub id: ActionId,
    /// The committed root the pre-check ran against.
    pub checked_against: StateRoot,
}
