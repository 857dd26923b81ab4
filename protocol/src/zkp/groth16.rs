//! [`ProofSystem`] backed by the Groth16 settlement circuit.
//!
//! ## Proof encoding
//!
//! ```text
//! transcript commitment (32 B, Fr little-endian) || compressed Groth16 proof
//! ```
//!
//! The transcript commitment is a public input the verifier cannot
//! recompute (it depends on intermediate roots), so it travels with the
//! proof. Everything else the verifier derives from the statement.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, ensure, Context, Result};
use ark_bn254::Fr;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::config::MAX_SETTLEMENT_BATCH;
use crate::crypto::hash::{bytes_to_field, field_to_bytes};
use crate::settlement::proof::{SettlementStatement, Transcript};

use super::circuit::{batch_commitment, SettlementWitness};
use super::mimc::MimcParams;
use super::prover::{CompressedProof, SettlementProver};
use super::verifier::SettlementVerifier;
use super::ProofSystem;

struct Keys {
    prover: SettlementProver,
    verifier: SettlementVerifier,
}

/// Groth16 over BN254 with a fixed batch capacity.
pub struct Groth16ProofSystem {
    capacity: usize,
    mimc: MimcParams,
    /// Fixed setup seed. `None` draws setup randomness from the OS.
    seed: Option<u64>,
    keys: RwLock<Option<Arc<Keys>>>,
}

impl Groth16ProofSystem {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            mimc: MimcParams::default(),
            seed: None,
            keys: RwLock::new(None),
        }
    }

    /// Deterministic setup, for tests and local devnets. Two instances with
    /// the same seed and shape produce interchangeable keys.
    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::new(capacity)
        }
    }

    /// Override the MiMC round count. Only useful to keep test circuits small.
    pub fn with_mimc(mut self, mimc: MimcParams) -> Self {
        self.mimc = mimc;
        self
    }

    fn keys(&self) -> Result<Arc<Keys>> {
        match self.keys.read().as_ref() {
            Some(keys) => Ok(Arc::clone(keys)),
            None => bail!("proof system is not compiled"),
        }
    }

    fn setup_rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    fn witness(&self, statement: &SettlementStatement, transcript: &Transcript) -> Result<SettlementWitness> {
        ensure!(
            transcript.old_root == statement.old_root,
            "transcript starts at {}, statement at {}",
            transcript.old_root,
            statement.old_root
        );
        ensure!(
            transcript.new_root() == statement.new_root,
            "transcript ends at {}, statement claims {}",
            transcript.new_root(),
            statement.new_root
        );
        ensure!(
            transcript.steps.len() == statement.actions.len(),
            "transcript has {} steps for {} actions",
            transcript.steps.len(),
            statement.actions.len()
        );
        for (step, action) in transcript.steps.iter().zip(&statement.actions) {
            ensure!(
                step.seq == action.seq && step.action_digest == action.digest,
                "transcript step {} does not match statement action {}",
                step.seq,
                action.seq
            );
        }

        let steps = transcript
            .steps
            .iter()
            .map(|s| (bytes_to_field(&s.action_digest), s.post_root.to_field()))
            .collect();
        SettlementWitness::padded(statement.old_root.to_field(), steps, self.capacity)
            .with_context(|| {
                format!(
                    "batch of {} exceeds circuit capacity {}",
                    statement.len(),
                    self.capacity
                )
            })
    }
}

impl Default for Groth16ProofSystem {
    fn default() -> Self {
        Self::new(MAX_SETTLEMENT_BATCH)
    }
}

impl ProofSystem for Groth16ProofSystem {
    fn compile(&self) -> Result<()> {
        let mut slot = self.keys.write();
        if slot.is_some() {
            return Ok(());
        }

        let started = Instant::now();
        let mut rng = self.setup_rng();
        let (prover, verifier) = SettlementProver::setup(self.mimc.clone(), self.capacity, &mut rng)?;
        *slot = Some(Arc::new(Keys { prover, verifier }));

        info!(
            capacity = self.capacity,
            rounds = self.mimc.rounds(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "settlement circuit compiled"
        );
        Ok(())
    }

    fn is_compiled(&self) -> bool {
        self.keys.read().is_some()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn prove(&self, statement: &SettlementStatement, transcript: &Transcript) -> Result<Vec<u8>> {
        let keys = self.keys()?;
        let witness = self.witness(statement, transcript)?;
        let transcript_fe = witness.transcript_commitment(&self.mimc);

        let started = Instant::now();
        let mut rng = StdRng::from_entropy();
        let proof = keys.prover.prove(witness, &mut rng)?;
        debug!(
            actions = statement.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "settlement proof generated"
        );

        let mut out = Vec::with_capacity(32 + proof.size());
        out.extend_from_slice(&field_to_bytes(&transcript_fe));
        out.extend_from_slice(proof.as_bytes());
        Ok(out)
    }

    fn verify(&self, proof: &[u8], statement: &SettlementStatement) -> Result<bool> {
        let keys = self.keys()?;
        if statement.len() > self.capacity || proof.len() <= 32 {
            return Ok(false);
        }

        let (transcript_bytes, groth) = proof.split_at(32);
        let mut transcript_le = [0u8; 32];
        transcript_le.copy_from_slice(transcript_bytes);
        let transcript_fe = bytes_to_field(&transcript_le);
        // Reject non-canonical encodings instead of silently reducing them.
        if field_to_bytes(&transcript_fe) != transcript_le {
            return Ok(false);
        }

        let Ok(groth) = CompressedProof::from_bytes(groth) else {
            return Ok(false);
        };

        let actions: Vec<Fr> = statement
            .actions
            .iter()
            .map(|a| bytes_to_field(&a.digest))
            .collect();
        let inputs = [
            statement.old_root.to_field(),
            statement.new_root.to_field(),
            batch_commitment(&self.mimc, &actions, self.capacity),
            transcript_fe,
        ];

        keys.verifier.verify(&groth, &inputs)
    }
}
