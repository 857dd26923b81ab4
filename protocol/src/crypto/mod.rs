//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations:
//!
//! - **Ed25519** for submitter identity and signed actions.
//! - **BLAKE3** for every digest outside the settlement circuit.
//!
//! The in-circuit hash lives in [`crate::zkp::mimc`] because it only makes
//! sense next to the constraints that mirror it.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, domain_separated_hash, hash_to_field};
pub use keys::{Address, KeyError, Keypair, Signature};
