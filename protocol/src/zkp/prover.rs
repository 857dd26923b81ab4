//! # Groth16 Proof Generation
//!
//! Wraps `ark-groth16` for the settlement circuit:
//!
//! 1. **Setup**: [`SettlementProver::setup`] runs once per circuit shape
//!    (capacity and MiMC round count) and returns both halves. In
//!    production, replace this with an MPC ceremony.
//!
//! 2. **Prove**: [`SettlementProver::prove`] populates a
//!    [`SettlementCircuit`] from a [`SettlementWitness`] and invokes
//!    `Groth16::prove`.
//!
//! 3. The resulting [`CompressedProof`] is ~128 bytes and is what travels
//!    inside a settlement transaction.

use anyhow::{ensure, Context, Result};
use ark_bn254::Bn254;
use ark_groth16::{Groth16, ProvingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{CryptoRng, Rng};

use super::circuit::{SettlementCircuit, SettlementWitness};
use super::mimc::MimcParams;
use super::verifier::SettlementVerifier;

// ---------------------------------------------------------------------------
// SettlementProver
// ---------------------------------------------------------------------------

/// Holds the Groth16 proving key for one settlement circuit shape.
///
/// Large but immutable; keep one for the lifetime of the settler.
pub struct SettlementProver {
    pk: ProvingKey<Bn254>,
    mimc: MimcParams,
    capacity: usize,
}

impl SettlementProver {
    /// Run the Groth16 setup for a circuit of `capacity` steps.
    pub fn setup<R: Rng + CryptoRng>(
        mimc: MimcParams,
        capacity: usize,
        rng: &mut R,
    ) -> Result<(Self, SettlementVerifier)> {
        ensure!(capacity > 0, "settlement circuit capacity must be positive");

        let blank = SettlementCircuit::blank(mimc.clone(), capacity);
        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(blank, rng)
            .context("Groth16 setup failed for the settlement circuit")?;

        let verifier = SettlementVerifier::from_vk(vk, mimc.clone(), capacity);
        Ok((Self { pk, mimc, capacity }, verifier))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mimc(&self) -> &MimcParams {
        &self.mimc
    }

    /// Prove that `witness` satisfies the circuit.
    ///
    /// # Errors
    ///
    /// Fails if the witness was padded for a different capacity or if the
    /// arkworks prover or serializer fails.
    pub fn prove<R: Rng + CryptoRng>(
        &self,
        witness: SettlementWitness,
        rng: &mut R,
    ) -> Result<CompressedProof> {
        ensure!(
            witness.steps.len() == self.capacity,
            "witness has {} steps, circuit capacity is {}",
            witness.steps.len(),
            self.capacity
        );

        let circuit = SettlementCircuit::new(self.mimc.clone(), witness);
        let proof = Groth16::<Bn254>::prove(&self.pk, circuit, rng)
            .context("Groth16 proof generation failed")?;

        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .context("proof serialization failed")?;

        Ok(CompressedProof { bytes })
    }
}

// ---------------------------------------------------------------------------
// CompressedProof
// ---------------------------------------------------------------------------

/// A serialized Groth16 proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedProof {
    bytes: Vec<u8>,
}

impl CompressedProof {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Reconstruct a proof from compressed bytes, rejecting anything that
    /// does not decode to valid curve points.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let _proof = ark_groth16::Proof::<Bn254>::deserialize_compressed(data)
            .context("invalid Groth16 proof bytes")?;
        Ok(Self {
            bytes: data.to_vec(),
        })
    }

    pub(crate) fn to_ark_proof(&self) -> Result<ark_groth16::Proof<Bn254>> {
        ark_groth16::Proof::<Bn254>::deserialize_compressed(&self.bytes[..])
            .map_err(|e| anyhow::anyhow!("proof deserialization failed: {}", e))
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}
