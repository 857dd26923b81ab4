//! # Settlement R1CS Circuit
//!
//! The statement being proved is:
//!
//! ```text
//! "I know per-step (action_i, post_i) for i in 0..N such that:
//!     1. fold(H, 0, action_0..action_N)                    == batch_commitment
//!     2. fold(H, old_root, H(action_i, post_i) for each i) == transcript_commitment
//!     3. post_{N-1}                                        == new_root
//!     4. action_i == 0  ⇒  post_i == post_{i-1}            (padding is a no-op)"
//! ```
//!
//! `N` is the circuit's fixed capacity. Batches shorter than `N` are padded
//! with zero actions that leave the root where it was.
//!
//! ## Public inputs (in order)
//!
//! | index | value |
//! |-------|-------|
//! | 0     | old root (Fr) |
//! | 1     | new root (Fr) |
//! | 2     | batch commitment |
//! | 3     | transcript commitment |
//!
//! The verifier recomputes the batch commitment from the action digests in
//! the settlement statement, so a proof cannot be replayed against a
//! different batch or a reordered one.

use ark_bn254::Fr;
use ark_ff::Zero;
use ark_r1cs_std::{
    alloc::AllocVar,
    eq::EqGadget,
    fields::{fp::FpVar, FieldVar},
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::mimc::MimcParams;

// ---------------------------------------------------------------------------
// Witness
// ---------------------------------------------------------------------------

/// One replayed batch, padded to a circuit capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementWitness {
    pub old_root: Fr,
    pub new_root: Fr,
    /// `(action digest, post-step root)` for every slot, padding included.
    pub steps: Vec<(Fr, Fr)>,
}

impl SettlementWitness {
    /// Pad `steps` out to `capacity`. Returns `None` if the batch is larger
    /// than the circuit.
    pub fn padded(old_root: Fr, steps: Vec<(Fr, Fr)>, capacity: usize) -> Option<Self> {
        if steps.len() > capacity {
            return None;
        }
        let new_root = steps.last().map(|(_, post)| *post).unwrap_or(old_root);
        let mut steps = steps;
        steps.resize(capacity, (Fr::zero(), new_root));
        Some(Self {
            old_root,
            new_root,
            steps,
        })
    }

    pub fn transcript_commitment(&self, mimc: &MimcParams) -> Fr {
        transcript_commitment(mimc, self.old_root, &self.steps)
    }

    /// Public input vector in allocation order.
    pub fn public_inputs(&self, mimc: &MimcParams) -> [Fr; 4] {
        let actions: Vec<Fr> = self.steps.iter().map(|(a, _)| *a).collect();
        [
            self.old_root,
            self.new_root,
            batch_commitment(mimc, &actions, self.steps.len()),
            self.transcript_commitment(mimc),
        ]
    }
}

/// Chain the action digests, zero-padded to `capacity`.
pub fn batch_commitment(mimc: &MimcParams, actions: &[Fr], capacity: usize) -> Fr {
    let padding = capacity.saturating_sub(actions.len());
    actions
        .iter()
        .copied()
        .chain(std::iter::repeat(Fr::zero()).take(padding))
        .fold(Fr::zero(), |acc, a| mimc.hash2(acc, a))
}

/// Chain `(action, post_root)` pairs starting from the old root.
pub fn transcript_commitment(mimc: &MimcParams, old_root: Fr, steps: &[(Fr, Fr)]) -> Fr {
    steps
        .iter()
        .fold(old_root, |acc, (a, post)| mimc.hash2(acc, mimc.hash2(*a, *post)))
}

// ---------------------------------------------------------------------------
// Circuit definition
// ---------------------------------------------------------------------------

/// Groth16 circuit for one settlement of fixed capacity.
///
/// `witness` is `None` during key generation; the constraint topology only
/// depends on `capacity` and the MiMC round count.
#[derive(Clone)]
pub struct SettlementCircuit {
    pub mimc: MimcParams,
    pub capacity: usize,
    pub witness: Option<SettlementWitness>,
}

impl SettlementCircuit {
    /// Blank circuit for CRS generation.
    pub fn blank(mimc: MimcParams, capacity: usize) -> Self {
        Self {
            mimc,
            capacity,
            witness: None,
        }
    }

    /// Fully-populated circuit for proving.
    pub fn new(mimc: MimcParams, witness: SettlementWitness) -> Self {
        Self {
            mimc,
            capacity: witness.steps.len(),
            witness: Some(witness),
        }
    }
}

impl ConstraintSynthesizer<Fr> for SettlementCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let inputs = self.witness.as_ref().map(|w| w.public_inputs(&self.mimc));
        let input = |i: usize| inputs.map(|v| v[i]).ok_or(SynthesisError::AssignmentMissing);

        // 1. Public inputs
        let old_root = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "old_root"), || input(0))?;
        let new_root = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "new_root"), || input(1))?;
        let batch = FpVar::<Fr>::new_input(ark_relations::ns!(cs, "batch"), || input(2))?;
        let transcript =
            FpVar::<Fr>::new_input(ark_relations::ns!(cs, "transcript"), || input(3))?;

        // 2. Per-step witnesses and both hash chains
        let mut batch_acc = FpVar::<Fr>::zero();
        let mut transcript_acc = old_root.clone();
        let mut prev_root = old_root;

        for i in 0..self.capacity {
            let step = self.witness.as_ref().map(|w| w.steps[i]);
            let action = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "action"), || {
                step.map(|(a, _)| a).ok_or(SynthesisError::AssignmentMissing)
            })?;
            let post = FpVar::<Fr>::new_witness(ark_relations::ns!(cs, "post_root"), || {
                step.map(|(_, p)| p).ok_or(SynthesisError::AssignmentMissing)
            })?;

            let is_padding = action.is_eq(&FpVar::zero())?;
            post.conditional_enforce_equal(&prev_root, &is_padding)?;

            batch_acc = self.mimc.hash2_var(&batch_acc, &action)?;
            let step_hash = self.mimc.hash2_var(&action, &post)?;
            transcript_acc = self.mimc.hash2_var(&transcript_acc, &step_hash)?;
            prev_root = post;
        }

        // 3. Bind the chains and the final root to the public inputs
        batch_acc.enforce_equal(&batch)?;
        transcript_acc.enforce_equal(&transcript)?;
        prev_root.enforce_equal(&new_root)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
