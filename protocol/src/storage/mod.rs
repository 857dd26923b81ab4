//! # Storage Module
//!
//! The off-chain state store and its persistence.
//!
//! ## Architecture
//!
//! ```text
//! smt.rs    — Sparse Merkle tree over 256-bit keys, compressed proofs
//! state.rs  — Snapshot (names + premium + fees), StateRoot, StateStore
//! db.rs     — sled persistence for the committed state and the action log
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! pending actions ──replay──▶ staged Snapshot ──settle──▶ committed Snapshot
//!                                                             │
//!                                                           NameDb
//! ```
//!
//! ## Design Decisions
//!
//! 1. **BLAKE3 for everything.** Leaves, nodes, and empty subtrees are all
//!    domain-separated BLAKE3.
//!
//! 2. **Persist the mapping, not the tree.** The tree is a pure function of
//!    the snapshot and is rebuilt on load, so there is nothing to keep in
//!    sync on disk.
//!
//! 3. **Bincode for on-disk serialization.** JSON is for the API; bincode is
//!    for storage.

pub mod db;
pub mod smt;
pub mod state;

pub use db::{DbError, NameDb};
pub use smt::{MerkleProof, SparseMerkleTree};
pub use state::{Snapshot, StateRoot, StateStore, StoreError};
