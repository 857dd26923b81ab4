//! Action kinds and signed submissions.
//!
//! An [`Action`] is what a client wants to happen to the directory. A
//! [`SignedAction`] is that intent bound to a submitter, a nonce and an
//! Ed25519 signature. The signature is what authorizes the action; the
//! transition rules only ever look at `submitter`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{DOMAIN_ACTION, DOMAIN_SIGNING, PROTOCOL_FINGERPRINT};
use crate::crypto::hash::domain_separated_hash_multi;
use crate::crypto::keys::{Address, Keypair, Signature};
use crate::names::{Name, NameError, NameRecord, PremiumSchedule};

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// The closed set of directory state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Claim an unregistered name.
    Register { name: Name, record: NameRecord },
    /// Replace the auxiliary fields of a name's record. The owner is kept.
    SetRecord { name: Name, record: NameRecord },
    /// Hand a name to a new owner.
    TransferOwnership { name: Name, new_owner: Address },
    /// Replace the premium schedule. Admin only.
    SetPremium { schedule: PremiumSchedule },
}

impl Action {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::SetRecord { .. } => "set_record",
            Self::TransferOwnership { .. } => "transfer_ownership",
            Self::SetPremium { .. } => "set_premium",
        }
    }

    /// The name this action touches, if any.
    pub fn name(&self) -> Option<&Name> {
        match self {
            Self::Register { name, .. }
            | Self::SetRecord { name, .. }
            | Self::TransferOwnership { name, .. } => Some(name),
            Self::SetPremium { .. } => None,
        }
    }

    /// Boundary checks that don't depend on state.
    pub fn validate(&self) -> Result<(), NameError> {
        match self {
            Self::Register { record, .. } | Self::SetRecord { record, .. } => record.validate(),
            Self::TransferOwnership { .. } | Self::SetPremium { .. } => Ok(()),
        }
    }

    /// Tagged, fixed-framing byte encoding.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128);
        match self {
            Self::Register { name, record } => {
                out.push(0x01);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(&record.canonical_bytes());
            }
            Self::SetRecord { name, record } => {
                out.push(0x02);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(&record.canonical_bytes());
            }
            Self::TransferOwnership { name, new_owner } => {
                out.push(0x03);
                out.extend_from_slice(name.as_bytes());
                out.extend_from_slice(new_owner.as_bytes());
            }
            Self::SetPremium { schedule } => {
                out.push(0x04);
                out.extend_from_slice(&schedule.canonical_bytes());
            }
        }
        out
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}({})", self.kind(), name),
            None => write!(f, "{}", self.kind()),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionId
// ---------------------------------------------------------------------------

/// Content address of a signed submission. Two submissions with the same
/// action, submitter and nonce share an id and are deduplicated.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub [u8; 32]);

impl ActionId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionId({}..)", &self.to_hex()[..12])
    }
}

// ---------------------------------------------------------------------------
// SignedAction
// ---------------------------------------------------------------------------

/// An action as submitted to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAction {
    pub action: Action,
    pub submitter: Address,
    /// Client-chosen; lets the same submitter send the same action twice.
    pub nonce: u64,
    pub signature: Signature,
}

impl SignedAction {
    /// Sign `action` as `keypair`.
    pub fn sign(action: Action, keypair: &Keypair, nonce: u64) -> Self {
        let submitter = keypair.address();
        let payload = signing_payload(&action, &submitter, nonce);
        let signature = keypair.sign(&payload);
        Self {
            action,
            submitter,
            nonce,
            signature,
        }
    }

    /// `true` if `signature` is `submitter`'s signature over this action.
    pub fn verify_signature(&self) -> bool {
        let payload = signing_payload(&self.action, &self.submitter, self.nonce);
        self.submitter.verify(&payload, &self.signature)
    }

    pub fn id(&self) -> ActionId {
        ActionId(domain_separated_hash_multi(
            DOMAIN_ACTION,
            &[
                b"id".as_slice(),
                self.action.canonical_bytes().as_slice(),
                self.submitter.as_bytes().as_slice(),
                &self.nonce.to_be_bytes()[..],
            ],
        ))
    }
}

/// The 32 bytes a submitter signs.
pub fn signing_payload(action: &Action, submitter: &Address, nonce: u64) -> [u8; 32] {
    domain_separated_hash_multi(
        DOMAIN_SIGNING,
        &[
            PROTOCOL_FINGERPRINT.as_bytes(),
            action.canonical_bytes().as_slice(),
            submitter.as_bytes().as_slice(),
            &nonce.to_be_bytes()[..],
        ],
    )
}
