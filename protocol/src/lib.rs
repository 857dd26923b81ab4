// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # NameLedger Protocol — Core Library
//!
//! A name → record directory whose authoritative state is a single root
//! committed on a ledger, while day-to-day writes pile up off-ledger as
//! pending actions and are periodically folded into a new root by a
//! verified settlement.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and hashing domains.
//! - **crypto** — BLAKE3 hashing, Ed25519 keys and addresses.
//! - **names** — Name encoding, records, the premium schedule.
//! - **actions** — Signed actions and the append-only action log.
//! - **rules** — The name-service transition rules. Pure.
//! - **storage** — Sparse Merkle state, committed/staged snapshots, sled.
//! - **zkp** — The proof capability: Groth16 over BN254.
//! - **settlement** — Replay, proof generation, the settlement scheduler.
//! - **error** — The public error taxonomy.
//!
//! ## Design Philosophy
//!
//! 1. Reads only ever see the committed root. Pending is pending.
//! 2. Replay order is log order, and the proof binds it.
//! 3. Every directory instance is a set of explicit handles. No globals.
//! 4. Validate early: whatever can fail at submission, fails at submission.

pub mod actions;
pub mod config;
pub mod crypto;
pub mod error;
pub mod names;
pub mod rules;
pub mod settlement;
pub mod storage;
pub mod zkp;

pub use error::NameServiceError;
