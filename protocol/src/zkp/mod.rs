//! # Zero-Knowledge Proof Module
//!
//! The proof capability behind settlement. The rest of the crate only sees
//! the [`ProofSystem`] trait: compile once, prove a replayed batch, verify
//! a proof against a statement. [`Groth16ProofSystem`] implements it over
//! BN254.
//!
//! ## Architecture
//!
//! ```text
//! mimc.rs      — MiMC-x⁵ hash, native and as an R1CS gadget
//! circuit.rs   — SettlementCircuit, SettlementWitness, batch/transcript chains
//! prover.rs    — Groth16 setup and proof generation (SettlementProver)
//! verifier.rs  — Groth16 verification (SettlementVerifier)
//! groth16.rs   — Groth16ProofSystem: the ProofSystem implementation
//! ```
//!
//! ## What the proof binds
//!
//! - **old root / new root**: public inputs, checked against the committed
//!   root and the claimed new root by the contract.
//! - **batch commitment**: a hash chain over the action digests, which
//!   commit to each action's content and log position. Reordering,
//!   dropping or adding an action changes it.
//! - **transcript commitment**: a hash chain over `(action, post-root)`
//!   pairs starting at the old root, ending at the new root.
//!
//! The trusted setup is per circuit shape. In production, replace the local
//! setup with an MPC-generated SRS.

pub mod circuit;
pub mod groth16;
pub mod mimc;
pub mod prover;
pub mod verifier;

pub use circuit::{SettlementCircuit, SettlementWitness};
pub use groth16::Groth16ProofSystem;
pub use mimc::MimcParams;
pub use prover::{CompressedProof, SettlementProver};
pub use verifier::SettlementVerifier;

use crate::settlement::proof::{SettlementStatement, Transcript};

/// The external proof-compiling capability.
///
/// Implementations must be deterministic in what they accept: `verify`
/// returns `true` exactly for proofs `prove` would produce for the same
/// statement.
pub trait ProofSystem: Send + Sync {
    /// One-time setup. Idempotent.
    fn compile(&self) -> anyhow::Result<()>;

    fn is_compiled(&self) -> bool;

    /// Largest batch a single proof can cover.
    fn capacity(&self) -> usize;

    /// Prove that `transcript` takes `statement.old_root` to
    /// `statement.new_root` by folding `statement.actions`.
    fn prove(&self, statement: &SettlementStatement, transcript: &Transcript)
        -> anyhow::Result<Vec<u8>>;

    /// `Ok(false)` for a proof that does not attest to `statement`.
    fn verify(&self, proof: &[u8], statement: &SettlementStatement) -> anyhow::Result<bool>;
}
