//! # Directory State
//!
//! [`Snapshot`] is one complete version of the directory: every name and
//! its record, the premium schedule in force, and the running total of
//! registration fees. Everything in it is committed into a
//! [`SparseMerkleTree`], and the tree's root is the [`StateRoot`] that the
//! settlement contract stores on the ledger.
//!
//! ## Leaf Layout
//!
//! | key                               | value hash                         |
//! |-----------------------------------|------------------------------------|
//! | `name.key()`                      | `BLAKE3(record.canonical_bytes())` |
//! | `reserved("premium_schedule")`    | `BLAKE3(schedule.canonical_bytes())` |
//! | `reserved("fees_collected")`      | `BLAKE3(u64_be(fees))`             |
//!
//! Name keys and reserved keys are derived under different BLAKE3 contexts,
//! so no name can ever shadow the premium schedule.
//!
//! ## StateStore
//!
//! [`StateStore`] owns the *committed* snapshot (the one behind the root on
//! the ledger) plus any *staged* snapshots a proof generator has produced
//! but that have not settled yet. Reads only ever see the committed
//! snapshot; a staged snapshot becomes visible in one step, through
//! [`StateStore::promote`], when the settlement contract accepts its proof.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use ark_bn254::Fr;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actions::Action;
use crate::config::DOMAIN_RESERVED_KEY;
use crate::crypto::hash::{blake3_hash, bytes_to_field, domain_separated_hash};
use crate::crypto::keys::Address;
use crate::names::{Name, NameRecord, PremiumSchedule};
use crate::rules::{Effect, RuleError, TransitionRules};

use super::db::{DbError, NameDb};
use super::smt::{MerkleProof, SparseMerkleTree};

// ---------------------------------------------------------------------------
// StateRoot
// ---------------------------------------------------------------------------

/// The 32-byte commitment to a [`Snapshot`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StateRoot(pub [u8; 32]);

impl StateRoot {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The root as a public input to the settlement circuit.
    pub fn to_field(&self) -> Fr {
        bytes_to_field(&self.0)
    }
}

impl fmt::Display for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRoot({}..)", &self.to_hex()[..12])
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

fn reserved_key(label: &str) -> [u8; 32] {
    domain_separated_hash(DOMAIN_RESERVED_KEY, label.as_bytes())
}

/// Tree key holding the premium schedule.
pub fn premium_key() -> [u8; 32] {
    reserved_key("premium_schedule")
}

/// Tree key holding the collected-fees counter.
pub fn fees_key() -> [u8; 32] {
    reserved_key("fees_collected")
}

/// A complete, self-committing version of the directory.
///
/// Cloning is the only way to get a new version; mutation is crate-private
/// and always goes through [`TransitionRules`], which keeps the records and
/// the tree in lockstep.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "SnapshotParts", from = "SnapshotParts")]
pub struct Snapshot {
    records: BTreeMap<Name, NameRecord>,
    premium: PremiumSchedule,
    fees_collected: u64,
    tree: SparseMerkleTree,
}

/// Serialized form of a [`Snapshot`]. The tree is rebuilt on load rather
/// than stored.
#[derive(Serialize, Deserialize)]
struct SnapshotParts {
    records: Vec<(Name, NameRecord)>,
    premium: PremiumSchedule,
    fees_collected: u64,
}

impl From<Snapshot> for SnapshotParts {
    fn from(s: Snapshot) -> Self {
        Self {
            records: s.records.into_iter().collect(),
            premium: s.premium,
            fees_collected: s.fees_collected,
        }
    }
}

impl From<SnapshotParts> for Snapshot {
    fn from(parts: SnapshotParts) -> Self {
        let mut snapshot = Snapshot::with_premium(parts.premium);
        for (name, record) in parts.records {
            snapshot.put_record(name, record);
        }
        snapshot.add_fees(parts.fees_collected);
        snapshot
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::genesis()
    }
}

impl Snapshot {
    /// The empty directory with the default premium schedule.
    pub fn genesis() -> Self {
        Self::with_premium(PremiumSchedule::default())
    }

    /// An empty directory with a custom opening schedule.
    pub fn with_premium(premium: PremiumSchedule) -> Self {
        let mut snapshot = Self {
            records: BTreeMap::new(),
            premium,
            fees_collected: 0,
            tree: SparseMerkleTree::new(),
        };
        snapshot.set_premium(premium);
        snapshot.commit_fees();
        snapshot
    }

    pub fn get(&self, name: &Name) -> Option<&NameRecord> {
        self.records.get(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.records.contains_key(name)
    }

    pub fn premium(&self) -> &PremiumSchedule {
        &self.premium
    }

    pub fn fees_collected(&self) -> u64 {
        self.fees_collected
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Name, &NameRecord)> {
        self.records.iter()
    }

    /// Root commitment of this snapshot. Deterministic: equal snapshots
    /// always produce equal roots.
    pub fn root(&self) -> StateRoot {
        StateRoot(self.tree.root())
    }

    /// Merkle proof for the tree slot an action reads.
    pub fn prove_for(&self, action: &Action) -> MerkleProof {
        match action.name() {
            Some(name) => self.tree.prove(&name.key()),
            None => self.tree.prove(&premium_key()),
        }
    }

    /// Merkle proof for `name` (inclusion or exclusion).
    pub fn prove(&self, name: &Name) -> MerkleProof {
        self.tree.prove(&name.key())
    }

    // -- crate-private mutation ---------------------------------------------

    pub(crate) fn put_record(&mut self, name: Name, record: NameRecord) {
        self.tree
            .insert(name.key(), blake3_hash(&record.canonical_bytes()));
        self.records.insert(name, record);
    }

    pub(crate) fn set_premium(&mut self, premium: PremiumSchedule) {
        self.tree
            .insert(premium_key(), blake3_hash(&premium.canonical_bytes()));
        self.premium = premium;
    }

    pub(crate) fn add_fees(&mut self, fee: u64) {
        self.fees_collected = self.fees_collected.saturating_add(fee);
        self.commit_fees();
    }

    fn commit_fees(&mut self) {
        self.tree
            .insert(fees_key(), blake3_hash(&self.fees_collected.to_be_bytes()));
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("names", &self.records.len())
            .field("fees_collected", &self.fees_collected)
            .field("root", &self.root())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Errors from staging and promoting snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stale root: expected committed root {expected}, found {actual}")]
    StaleRoot {
        expected: StateRoot,
        actual: StateRoot,
    },

    #[error("no staged snapshot for root {0}")]
    UnknownStagedRoot(StateRoot),

    #[error("database error: {0}")]
    Db(#[from] DbError),
}

/// Committed directory state plus snapshots awaiting settlement.
///
/// One `StateStore` belongs to exactly one directory instance. It is shared
/// by handle (`Arc<StateStore>`) between the contract, the proof generator
/// and the API, never through a global.
pub struct StateStore {
    rules: TransitionRules,
    committed: RwLock<Snapshot>,
    staged: Mutex<HashMap<StateRoot, Snapshot>>,
    db: Option<Arc<NameDb>>,
}

impl StateStore {
    /// In-memory store starting from genesis.
    pub fn new(rules: TransitionRules) -> Self {
        Self {
            rules,
            committed: RwLock::new(Snapshot::genesis()),
            staged: Mutex::new(HashMap::new()),
            db: None,
        }
    }

    /// Durable store. Resumes from the last committed snapshot in `db`, or
    /// writes genesis if the database is fresh.
    pub fn open(rules: TransitionRules, db: Arc<NameDb>) -> Result<Self, StoreError> {
        let committed = match db.get_committed()? {
            Some(snapshot) => {
                info!(root = %snapshot.root(), names = snapshot.len(), "resumed committed state");
                snapshot
            }
            None => {
                let genesis = Snapshot::genesis();
                db.put_committed(&genesis)?;
                info!(root = %genesis.root(), "initialized genesis state");
                genesis
            }
        };

        Ok(Self {
            rules,
            committed: RwLock::new(committed),
            staged: Mutex::new(HashMap::new()),
            db: Some(db),
        })
    }

    pub fn rules(&self) -> &TransitionRules {
        &self.rules
    }

    /// Resolve `name` against the committed snapshot. Pending actions are
    /// never visible here.
    pub fn get(&self, name: &Name) -> Option<NameRecord> {
        self.committed.read().get(name).cloned()
    }

    /// A copy of the committed snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.committed.read().clone()
    }

    pub fn committed_root(&self) -> StateRoot {
        self.committed.read().root()
    }

    /// Run `f` against the committed snapshot without copying it.
    pub fn with_committed<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        f(&self.committed.read())
    }

    /// Submission-time check of `action` against the committed snapshot.
    pub fn check(&self, action: &Action, submitter: &Address) -> Result<Effect, RuleError> {
        self.rules.check(&self.committed.read(), action, submitter)
    }

    /// Pure transition: `snapshot` with `action` applied.
    pub fn apply(
        &self,
        action: &Action,
        submitter: &Address,
        snapshot: &Snapshot,
    ) -> Result<Snapshot, RuleError> {
        self.rules.apply(snapshot, action, submitter)
    }

    /// Root `snapshot` would commit to. Pure.
    pub fn commit(&self, snapshot: &Snapshot) -> StateRoot {
        snapshot.root()
    }

    /// Hold `snapshot` until a settlement for its root is accepted.
    pub fn stage(&self, snapshot: Snapshot) -> StateRoot {
        let root = snapshot.root();
        self.staged.lock().insert(root, snapshot);
        debug!(root = %root, "snapshot staged");
        root
    }

    /// Drop a staged snapshot (its settlement was abandoned or rejected).
    pub fn discard_staged(&self, root: &StateRoot) -> bool {
        self.staged.lock().remove(root).is_some()
    }

    pub fn staged_count(&self) -> usize {
        self.staged.lock().len()
    }

    /// Atomically replace the committed snapshot with the staged one for
    /// `new_root`, provided the committed root is still `old_root`.
    ///
    /// `settled` names the log entries folded into `new_root`. On a durable
    /// store they leave the on-disk log in the same transaction that writes
    /// the new snapshot; the caller still drops them from the in-memory log.
    /// On any error the committed snapshot is unchanged. Every other staged
    /// snapshot was built on `old_root` and is dropped.
    pub fn promote(
        &self,
        old_root: &StateRoot,
        new_root: &StateRoot,
        settled: &[u64],
    ) -> Result<(), StoreError> {
        let mut committed = self.committed.write();
        let actual = committed.root();
        if actual != *old_root {
            return Err(StoreError::StaleRoot {
                expected: *old_root,
                actual,
            });
        }

        let mut staged = self.staged.lock();
        let next = staged
            .remove(new_root)
            .ok_or(StoreError::UnknownStagedRoot(*new_root))?;

        if let Some(db) = &self.db {
            if let Err(e) = db.commit_settlement(&next, settled) {
                staged.insert(*new_root, next);
                return Err(e.into());
            }
        }

        *committed = next;
        staged.clear();
        info!(old_root = %old_root, new_root = %new_root, names = committed.len(), "committed root advanced");
        Ok(())
    }
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("committed_root", &self.committed_root())
            .field("staged", &self.staged_count())
            .field("durable", &self.db.is_some())
            .finish()
    }
}
