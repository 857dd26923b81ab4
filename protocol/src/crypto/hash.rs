//! # Hashing Utilities
//!
//! Every digest in nameledger is BLAKE3. There is exactly one hash function
//! outside the circuit, and it is used in three shapes:
//!
//! - **plain** ([`blake3_hash`]) for content addressing,
//! - **domain-separated** ([`domain_separated_hash`]) for anything that ends
//!   up inside a commitment, so a leaf can never be replayed as a node,
//! - **hash-to-field** ([`hash_to_field`]) when bytes need to enter the
//!   settlement circuit as a BN254 scalar.
//!
//! ## hash_to_field
//!
//! Hash with BLAKE3, read the 32 bytes as a little-endian integer, reduce
//! modulo the BN254 scalar order. The bias from the reduction is below
//! 2^-128, which is the same security margin as everything else here.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use nameledger_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"alice");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash multiple byte slices together without concatenation overhead.
pub fn blake3_hash_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Compute a domain-separated hash using BLAKE3's `derive_key` mode.
///
/// `domain_separated_hash("a", data)` and `domain_separated_hash("b", data)`
/// never collide: the context string selects a different internal IV.
/// Contexts live in [`crate::config`] as `DOMAIN_*` constants.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}

/// Domain-separated variant of [`blake3_hash_multi`].
///
/// Callers hashing variable-length parts are responsible for making the
/// framing unambiguous (length prefixes, fixed widths).
pub fn domain_separated_hash_multi(context: &str, parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    for part in parts {
        hasher.update(part);
    }
    *hasher.finalize().as_bytes()
}

/// Hash arbitrary data to a BN254 scalar field element.
///
/// # Example
///
/// ```
/// use nameledger_protocol::crypto::hash::hash_to_field;
///
/// let a = hash_to_field(b"register alice");
/// let b = hash_to_field(b"register alice");
/// assert_eq!(a, b);
/// ```
pub fn hash_to_field(data: &[u8]) -> Fr {
    bytes_to_field(&blake3_hash(data))
}

/// Interpret 32 bytes as a little-endian integer and reduce into Fr.
///
/// Used to lift digests that are already uniformly distributed (state
/// roots, action digests) into the circuit without hashing twice.
pub fn bytes_to_field(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Canonical 32-byte little-endian encoding of a field element.
pub fn field_to_bytes(fe: &Fr) -> [u8; 32] {
    let le = fe.into_bigint().to_bytes_le();
    let mut out = [0u8; 32];
    out[..le.len()].copy_from_slice(&le);
    out
}
