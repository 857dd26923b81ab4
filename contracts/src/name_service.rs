//! # Name Service Settlement Contract
//!
//! The on-ledger half of the directory. It holds the committed root, gates
//! what enters the action log, and is the only thing that may advance the
//! root.
//!
//! ## Submission
//!
//! 1. **Validate** — record fields within bounds.
//! 2. **Authenticate** — the signature must be the submitter's.
//! 3. **Pre-check** — the transition rule for the action must pass against
//!    the *committed* snapshot. Pending actions are invisible here, so a
//!    transfer of a name that is registered but not yet settled fails.
//! 4. **Append** — the action gets the next sequence number in the log.
//!
//! ## Settlement
//!
//! `settle` runs entirely under the root lock, which makes it the single
//! serialization point for the directory:
//!
//! 1. The proof's old root must be the committed root (`StaleRoot`).
//! 2. The proof's batch must be exactly the oldest pending actions.
//! 3. The proof must verify.
//! 4. Replaying the batch on the committed snapshot must reach the proven
//!    root. The receipt's applied and dropped lists come from this replay,
//!    never from the submitted proof.
//! 5. The staged snapshot is promoted and the batch leaves the durable log
//!    in the same transaction, then the root advances in memory.
//!
//! A failure in steps 1–5 leaves root, store and log unchanged.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use nameledger_protocol::actions::{ActionLog, LogError, LoggedAction, SignedAction};
use nameledger_protocol::crypto::keys::Address;
use nameledger_protocol::error::NameServiceError;
use nameledger_protocol::names::{Name, NameRecord, PremiumSchedule};
use nameledger_protocol::rules::TransitionRules;
use nameledger_protocol::settlement::proof::{
    ActionReceipt, ActionRef, SettlementProof, SettlementReceipt,
};
use nameledger_protocol::settlement::replay;
use nameledger_protocol::storage::smt::MerkleProof;
use nameledger_protocol::storage::state::{StateRoot, StateStore, StoreError};
use nameledger_protocol::zkp::ProofSystem;

/// One deployed directory instance.
pub struct NameService {
    store: Arc<StateStore>,
    log: Arc<ActionLog>,
    verifier: Arc<dyn ProofSystem>,
    /// The ledger-verified root. Only `settle` writes it.
    root: Mutex<StateRoot>,
    settlements: AtomicUsize,
    last_receipt: RwLock<Option<SettlementReceipt>>,
}

impl NameService {
    /// Deploy against an existing store and log. The committed root starts
    /// at whatever the store has committed, so a restarted node resumes
    /// where it stopped.
    pub fn deploy(
        store: Arc<StateStore>,
        log: Arc<ActionLog>,
        verifier: Arc<dyn ProofSystem>,
    ) -> Self {
        let root = store.committed_root();
        info!(
            root = %root,
            admin = %store.rules().admin(),
            pending = log.len(),
            "name service deployed"
        );
        Self {
            store,
            log,
            verifier,
            root: Mutex::new(root),
            settlements: AtomicUsize::new(0),
            last_receipt: RwLock::new(None),
        }
    }

    pub fn admin(&self) -> &Address {
        self.store.rules().admin()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn log(&self) -> &Arc<ActionLog> {
        &self.log
    }

    // -- Submission ---------------------------------------------------------

    /// Accept a signed action into the log, or say why not.
    pub fn submit(&self, signed: SignedAction) -> Result<ActionReceipt, NameServiceError> {
        signed
            .action
            .validate()
            .map_err(|e| NameServiceError::SubmissionRejected(e.to_string()))?;

        if !signed.verify_signature() {
            return Err(NameServiceError::SubmissionRejected(format!(
                "invalid signature for submitter {}",
                signed.submitter
            )));
        }

        let checked_against = self.committed_root();
        self.store
            .check(&signed.action, &signed.submitter)
            .map_err(|e| {
                warn!(action = %signed.action, submitter = %signed.submitter, reason = %e, "submission refused");
                NameServiceError::from(e)
            })?;

        let logged = self.log.append(signed).map_err(|e| match e {
            LogError::Db(db) => NameServiceError::Storage(db.to_string()),
            other => NameServiceError::SubmissionRejected(other.to_string()),
        })?;

        info!(
            seq = logged.seq,
            action = %logged.signed.action,
            submitter = %logged.signed.submitter,
            "action accepted"
        );
        Ok(ActionReceipt {
            seq: logged.seq,
            id: logged.id,
            checked_against,
        })
    }

    // -- Settlement ---------------------------------------------------------

    /// Verify `proof` and advance the committed root.
    pub fn settle(&self, proof: &SettlementProof) -> Result<SettlementReceipt, NameServiceError> {
        let mut root = self.root.lock();
        let statement = &proof.statement;

        let committed = *root;
        if statement.old_root != committed {
            warn!(proof_root = %statement.old_root, committed = %committed, "stale settlement rejected");
            return Err(NameServiceError::StaleRoot {
                expected: statement.old_root,
                actual: committed,
            });
        }

        if statement.is_empty() {
            return Err(NameServiceError::InvalidProof(
                "settlement covers no actions".to_string(),
            ));
        }

        let head: Vec<LoggedAction> = self.log.pending().iter().take(statement.len()).collect();
        let matches_log = head.len() == statement.len()
            && head
                .iter()
                .zip(&statement.actions)
                .all(|(logged, claimed)| ActionRef::from(logged) == *claimed);
        if !matches_log {
            return Err(NameServiceError::InvalidProof(
                "batch is not the head of the pending log".to_string(),
            ));
        }

        match self.verifier.verify(&proof.proof, statement) {
            Ok(true) => {}
            Ok(false) => {
                warn!(new_root = %statement.new_root, "settlement proof did not verify");
                return Err(NameServiceError::InvalidProof(
                    "proof does not verify".to_string(),
                ));
            }
            Err(e) => {
                return Err(NameServiceError::InvalidProof(format!("{:#}", e)));
            }
        }

        let replayed = self
            .store
            .with_committed(|base| replay(self.store.rules(), base, &head));
        if replayed.snapshot.root() != statement.new_root {
            warn!(
                proven = %statement.new_root,
                replayed = %replayed.snapshot.root(),
                "proven root does not match replay of the batch"
            );
            return Err(NameServiceError::InvalidProof(
                "replay of the batch does not reach the proven root".to_string(),
            ));
        }

        let seqs = statement.seqs();
        self.store
            .promote(&statement.old_root, &statement.new_root, &seqs)
            .map_err(|e| match e {
                StoreError::StaleRoot { expected, actual } => {
                    NameServiceError::StaleRoot { expected, actual }
                }
                StoreError::UnknownStagedRoot(r) => {
                    NameServiceError::InvalidProof(format!("no staged state for root {}", r))
                }
                StoreError::Db(db) => NameServiceError::Storage(db.to_string()),
            })?;
        *root = statement.new_root;
        self.log.retire_settled(&seqs);

        let dropped = replayed.dropped;
        let receipt = SettlementReceipt {
            old_root: statement.old_root,
            new_root: statement.new_root,
            applied: statement.len() - dropped.len(),
            dropped,
        };
        info!(
            old_root = %receipt.old_root,
            new_root = %receipt.new_root,
            applied = receipt.applied,
            dropped = receipt.dropped.len(),
            "committed root advanced"
        );
        self.settlements.fetch_add(1, Ordering::Relaxed);
        *self.last_receipt.write() = Some(receipt.clone());
        Ok(receipt)
    }

    // -- Committed reads ----------------------------------------------------

    pub fn committed_root(&self) -> StateRoot {
        *self.root.lock()
    }

    /// Resolve against the committed state only.
    pub fn resolve_name(&self, name: &Name) -> Result<NameRecord, NameServiceError> {
        self.store
            .get(name)
            .ok_or_else(|| NameServiceError::NotFound(name.to_string()))
    }

    pub fn owner_of(&self, name: &Name) -> Result<Address, NameServiceError> {
        self.resolve_name(name).map(|r| r.owner)
    }

    /// Inclusion or exclusion proof for `name` against the committed root.
    pub fn membership_proof(&self, name: &Name) -> (MerkleProof, StateRoot) {
        self.store
            .with_committed(|snapshot| (snapshot.prove(name), snapshot.root()))
    }

    pub fn premium_schedule(&self) -> PremiumSchedule {
        self.store.with_committed(|s| *s.premium())
    }

    /// Multiplier for names of `len` characters.
    pub fn premium_rate(&self, len: usize) -> u64 {
        self.store.with_committed(|s| s.premium().rate(len))
    }

    /// What registering `name` would cost under the committed schedule.
    pub fn registration_fee(&self, name: &Name) -> u64 {
        self.store
            .with_committed(|s| TransitionRules::registration_fee(name, s.premium()))
    }

    pub fn fees_collected(&self) -> u64 {
        self.store.with_committed(|s| s.fees_collected())
    }

    pub fn name_count(&self) -> usize {
        self.store.with_committed(|s| s.len())
    }

    // -- Log views ----------------------------------------------------------

    pub fn pending_count(&self) -> usize {
        self.log.len()
    }

    /// Actions delivered after `cursor`, in ledger order.
    pub fn actions_since(&self, cursor: Option<u64>) -> Vec<LoggedAction> {
        self.log.since(cursor)
    }

    /// Settlements accepted since this instance was deployed.
    pub fn settlement_count(&self) -> usize {
        self.settlements.load(Ordering::Relaxed)
    }

    pub fn last_settlement(&self) -> Option<SettlementReceipt> {
        self.last_receipt.read().clone()
    }
}

impl std::fmt::Debug for NameService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameService")
            .field("root", &self.committed_root())
            .field("pending", &self.pending_count())
            .field("settlements", &self.settlement_count())
            .finish()
    }
}
