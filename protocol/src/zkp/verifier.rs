//! # Groth16 Proof Verification
//!
//! The verifier side of the settlement proof. The settlement contract holds
//! a [`SettlementVerifier`] and checks every proof before it advances the
//! committed root.
//!
//! Groth16 verification is three pairings plus a small multi-scalar
//! multiplication over the four public inputs, so it costs the same no
//! matter how many actions the batch folded.

use anyhow::{Context, Result};
use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;

use super::mimc::MimcParams;
use super::prover::CompressedProof;

/// Holds the Groth16 verification key for one settlement circuit shape.
pub struct SettlementVerifier {
    vk: VerifyingKey<Bn254>,
    mimc: MimcParams,
    capacity: usize,
}

impl SettlementVerifier {
    pub(crate) fn from_vk(vk: VerifyingKey<Bn254>, mimc: MimcParams, capacity: usize) -> Self {
        Self { vk, mimc, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mimc(&self) -> &MimcParams {
        &self.mimc
    }

    /// Check `proof` against `[old_root, new_root, batch, transcript]`.
    ///
    /// `Ok(false)` means the proof is well-formed but wrong. `Err` means it
    /// could not be decoded or the pairing check itself failed.
    pub fn verify(&self, proof: &CompressedProof, public_inputs: &[Fr; 4]) -> Result<bool> {
        let ark_proof = proof
            .to_ark_proof()
            .context("failed to deserialize proof")?;

        let valid = Groth16::<Bn254>::verify(&self.vk, public_inputs, &ark_proof)
            .context("Groth16 verification algorithm failed")?;

        Ok(valid)
    }

    /// Serialize the verification key for distribution.
    pub fn vk_to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.vk
            .serialize_compressed(&mut buf)
            .context("verification key serialization failed")?;
        Ok(buf)
    }

    pub fn vk_from_bytes(data: &[u8], mimc: MimcParams, capacity: usize) -> Result<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(data)
            .context("failed to deserialize verification key")?;
        Ok(Self { vk, mimc, capacity })
    }
}
