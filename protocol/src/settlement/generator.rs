//! # Settlement Proof Generator
//!
//! Turns "a bunch of pending actions" into "a proof that the directory
//! moved from the committed root to a new one".
//!
//! ## Pipeline Stages
//!
//! ```text
//! 1. SELECT  — Take the oldest pending actions, up to the batch cap
//! 2. REPLAY  — Fold them in log order from the committed snapshot; drop
//!              actions whose rule fails at their replay point
//! 3. PROVE   — Hand (statement, transcript) to the proof system
//! 4. STAGE   — Park the resulting snapshot in the store under its root
//! ```
//!
//! If stage 3 fails nothing is staged and the log is untouched; the batch
//! is retried whole on the next attempt. Nothing is ever partially applied.
//!
//! Dropped actions still occupy their slot in the batch. They are consumed
//! by the settlement and do not come back.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::actions::{ActionLog, LoggedAction};
use crate::config::MAX_SETTLEMENT_BATCH;
use crate::rules::TransitionRules;
use crate::storage::state::{Snapshot, StateRoot, StateStore};
use crate::zkp::ProofSystem;

use super::error::SettlementError;
use super::proof::{
    ActionRef, DroppedAction, SettlementProof, SettlementStatement, StepOutcome, Transcript,
    TranscriptStep,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Upper bound on actions per settlement. The effective cap is the
    /// smaller of this and the proof system's capacity.
    pub max_batch: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_batch: MAX_SETTLEMENT_BATCH,
        }
    }
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

/// The result of folding one batch.
#[derive(Debug, Clone)]
pub struct Replay {
    pub snapshot: Snapshot,
    pub transcript: Transcript,
    pub dropped: Vec<DroppedAction>,
}

/// Fold `batch`, in order, on top of `base`.
///
/// Deterministic: the same base and batch always give the same snapshot,
/// root and transcript.
pub fn replay(rules: &TransitionRules, base: &Snapshot, batch: &[LoggedAction]) -> Replay {
    let mut snapshot = base.clone();
    let mut transcript = Transcript::new(base.root());
    let mut dropped = Vec::new();

    for logged in batch {
        let action = &logged.signed.action;
        let submitter = logged.signed.submitter;
        let pre_root = snapshot.root();
        let read_proof = snapshot.prove_for(action);

        let outcome = match rules.fold(&mut snapshot, action, &submitter) {
            Ok(effect) => StepOutcome::Applied(effect),
            Err(reason) => {
                info!(
                    seq = logged.seq,
                    action = %action,
                    submitter = %submitter,
                    reason = %reason,
                    "action dropped at replay"
                );
                dropped.push(DroppedAction {
                    seq: logged.seq,
                    reason: reason.clone(),
                });
                StepOutcome::Dropped(reason)
            }
        };

        transcript.steps.push(TranscriptStep {
            seq: logged.seq,
            id: logged.id,
            action_digest: logged.digest(),
            submitter,
            pre_root,
            post_root: snapshot.root(),
            read_proof,
            outcome,
        });
    }

    Replay {
        snapshot,
        transcript,
        dropped,
    }
}

// ---------------------------------------------------------------------------
// SettlementProofGenerator
// ---------------------------------------------------------------------------

/// Builds settlement proofs for one directory instance.
pub struct SettlementProofGenerator {
    store: Arc<StateStore>,
    log: Arc<ActionLog>,
    prover: Arc<dyn ProofSystem>,
    config: GeneratorConfig,
}

impl SettlementProofGenerator {
    pub fn new(
        store: Arc<StateStore>,
        log: Arc<ActionLog>,
        prover: Arc<dyn ProofSystem>,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            store,
            log,
            prover,
            config,
        }
    }

    /// Effective batch cap.
    pub fn batch_limit(&self) -> usize {
        self.config.max_batch.min(self.prover.capacity()).max(1)
    }

    /// Replay the oldest pending actions against the committed root, prove
    /// the transition, and stage the result.
    ///
    /// Returns the proof and the new root it commits to.
    pub fn create_settlement_proof(&self) -> Result<(SettlementProof, StateRoot), SettlementError> {
        // 1. SELECT
        let base = self.store.snapshot();
        let batch: Vec<LoggedAction> = self.log.pending().iter().take(self.batch_limit()).collect();
        if batch.is_empty() {
            return Err(SettlementError::EmptyBatch);
        }

        // 2. REPLAY
        let replayed = replay(self.store.rules(), &base, &batch);
        let statement = SettlementStatement {
            old_root: replayed.transcript.old_root,
            new_root: replayed.transcript.new_root(),
            actions: batch.iter().map(ActionRef::from).collect(),
        };
        debug!(
            actions = statement.len(),
            dropped = replayed.dropped.len(),
            old_root = %statement.old_root,
            new_root = %statement.new_root,
            "batch replayed"
        );

        // 3. PROVE
        let started = Instant::now();
        let proof_bytes = self
            .ensure_compiled()
            .and_then(|()| self.prover.prove(&statement, &replayed.transcript))
            .map_err(|e| {
                warn!(error = %e, actions = statement.len(), "settlement proof construction failed");
                SettlementError::ProofConstructionFailed(format!("{:#}", e))
            })?;
        info!(
            actions = statement.len(),
            dropped = replayed.dropped.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            new_root = %statement.new_root,
            "settlement proof constructed"
        );

        // 4. STAGE
        let new_root = self.store.stage(replayed.snapshot);
        let outcomes = replayed
            .transcript
            .steps
            .into_iter()
            .map(|s| s.outcome)
            .collect();

        Ok((
            SettlementProof {
                statement,
                outcomes,
                proof: proof_bytes,
            },
            new_root,
        ))
    }

    fn ensure_compiled(&self) -> anyhow::Result<()> {
        if self.prover.is_compiled() {
            return Ok(());
        }
        self.prover.compile()
    }
}
