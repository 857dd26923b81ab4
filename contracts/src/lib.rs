//! # NameLedger Contracts
//!
//! On-ledger logic for the name directory.
//!
//! - **Name Service** — holds the committed root, gates submissions with
//!   signature checks and transition-rule pre-checks against the committed
//!   state, and advances the root only on a verified settlement proof.
//!
//! ## Design Principles
//!
//! 1. One writer for the root: `settle`, under one lock.
//! 2. Reads resolve against the committed root, never pending actions.
//! 3. Signature verification gates every submission.
//! 4. Failures leave root, store and log exactly as they were.

pub mod name_service;

pub use name_service::NameService;
