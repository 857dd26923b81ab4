//! # Name-Service Transition Rules
//!
//! One rule per [`Action`] kind, each a pure function of a [`Snapshot`] and
//! the submitter's address.
//!
//! | Action               | Precondition                     | Rejection            |
//! |----------------------|----------------------------------|----------------------|
//! | `register`           | name absent                      | `AlreadyRegistered`  |
//! | `set_record`         | name present, submitter is owner | `NotFound`/`NotOwner`|
//! | `transfer_ownership` | name present, submitter is owner | `NotFound`/`NotOwner`|
//! | `set_premium`        | submitter is the admin           | `NotAdmin`           |
//!
//! The same rules run twice. At submission they run against the committed
//! snapshot and a failure is returned to the client. During replay they run
//! against the snapshot as folded so far within the batch; a failure there
//! drops the action from the transition and nothing else happens. The
//! registration fee is read from the premium schedule *at the replay point*,
//! so a `set_premium` earlier in a batch prices every later `register`.

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::crypto::keys::Address;
use crate::names::{Name, NameRecord, PremiumSchedule};
use crate::storage::state::Snapshot;

/// Why a rule refused an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RuleError {
    #[error("name {0} is already registered")]
    AlreadyRegistered(Name),

    #[error("name {0} is not registered")]
    NotFound(Name),

    #[error("{submitter} does not own {name}")]
    NotOwner { name: Name, submitter: Address },

    #[error("{0} is not the administrator")]
    NotAdmin(Address),
}

/// What an admitted action does to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Registered { name: Name, fee: u64 },
    RecordUpdated { name: Name },
    OwnershipTransferred { name: Name, from: Address, to: Address },
    PremiumUpdated { schedule: PremiumSchedule },
}

/// The rule set for one directory instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRules {
    admin: Address,
}

impl TransitionRules {
    pub fn new(admin: Address) -> Self {
        Self { admin }
    }

    pub fn admin(&self) -> &Address {
        &self.admin
    }

    /// Premium fee for `name` under `schedule`.
    pub fn registration_fee(name: &Name, schedule: &PremiumSchedule) -> u64 {
        schedule.fee_for(name)
    }

    /// Decide whether `action` is admissible against `snapshot`, and what it
    /// would do. Never mutates anything.
    pub fn check(
        &self,
        snapshot: &Snapshot,
        action: &Action,
        submitter: &Address,
    ) -> Result<Effect, RuleError> {
        match action {
            Action::Register { name, .. } => {
                if snapshot.contains(name) {
                    return Err(RuleError::AlreadyRegistered(*name));
                }
                Ok(Effect::Registered {
                    name: *name,
                    fee: Self::registration_fee(name, snapshot.premium()),
                })
            }
            Action::SetRecord { name, .. } => {
                owned_by(snapshot, name, submitter)?;
                Ok(Effect::RecordUpdated { name: *name })
            }
            Action::TransferOwnership { name, new_owner } => {
                let from = owned_by(snapshot, name, submitter)?;
                Ok(Effect::OwnershipTransferred {
                    name: *name,
                    from,
                    to: *new_owner,
                })
            }
            Action::SetPremium { schedule } => {
                if *submitter != self.admin {
                    return Err(RuleError::NotAdmin(*submitter));
                }
                Ok(Effect::PremiumUpdated {
                    schedule: *schedule,
                })
            }
        }
    }

    /// Apply `action` to `snapshot` in place. On rejection the snapshot is
    /// left exactly as it was.
    pub fn fold(
        &self,
        snapshot: &mut Snapshot,
        action: &Action,
        submitter: &Address,
    ) -> Result<Effect, RuleError> {
        let effect = self.check(snapshot, action, submitter)?;
        match action {
            Action::Register { name, record } => {
                let fee = Self::registration_fee(name, snapshot.premium());
                snapshot.put_record(*name, record.clone());
                snapshot.add_fees(fee);
            }
            Action::SetRecord { name, record } => {
                // Owner is not a mutable field of set_record.
                let owner = current_owner(snapshot, name)?;
                let updated = NameRecord {
                    owner,
                    ..record.clone()
                };
                snapshot.put_record(*name, updated);
            }
            Action::TransferOwnership { name, new_owner } => {
                let mut record = snapshot
                    .get(name)
                    .cloned()
                    .ok_or(RuleError::NotFound(*name))?;
                record.owner = *new_owner;
                snapshot.put_record(*name, record);
            }
            Action::SetPremium { schedule } => {
                snapshot.set_premium(*schedule);
            }
        }
        Ok(effect)
    }

    /// Pure transition: a new snapshot with `action` applied.
    pub fn apply(
        &self,
        snapshot: &Snapshot,
        action: &Action,
        submitter: &Address,
    ) -> Result<Snapshot, RuleError> {
        let mut next = snapshot.clone();
        self.fold(&mut next, action, submitter)?;
        Ok(next)
    }
}

fn current_owner(snapshot: &Snapshot, name: &Name) -> Result<Address, RuleError> {
    snapshot
        .get(name)
        .map(|r| r.owner)
        .ok_or(RuleError::NotFound(*name))
}

fn owned_by(snapshot: &Snapshot, name: &Name, submitter: &Address) -> Result<Address, RuleError> {
    let owner = current_owner(snapshot, name)?;
    if owner != *submitter {
        return Err(RuleError::NotOwner {
            name: *name,
            submitter: *submitter,
        });
    }
    Ok(owner)
}
