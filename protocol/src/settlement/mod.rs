//! # Settlement
//!
//! Folding pending actions into a new committed root.
//!
//! ```text
//! proof.rs     — SettlementStatement, Transcript, SettlementProof, receipts
//! generator.rs — replay + SettlementProofGenerator
//! scheduler.rs — SettlementScheduler: when to settle, retries, shutdown
//! error.rs     — SettlementError
//! ```
//!
//! ## Data Flow
//!
//! ```text
//!  ActionLog ──pending()──▶ generator ──replay──▶ Transcript ──prove──▶ SettlementProof
//!                               │                                            │
//!                          stage(snapshot)                            contract.settle()
//!                               ▼                                            │
//!                          StateStore ◀──────────── promote(old, new, batch) ┘
//! ```

pub mod error;
pub mod generator;
pub mod proof;
pub mod scheduler;

pub use error::SettlementError;
pub use generator::{replay, GeneratorConfig, Replay, SettlementProofGenerator};
pub use proof::{
    ActionReceipt, ActionRef, DroppedAction, SettlementProof, SettlementReceipt,
    SettlementStatement, StepOutcome, Transcript, TranscriptStep,
};
pub use scheduler::{
    CycleReport, Decision, Phase, SchedulerConfig, SettlementScheduler, SettlementTarget,
};
