//! # Actions
//!
//! What clients submit and where it waits until settlement.
//!
//! ```text
//! action.rs — Action kinds, SignedAction, ActionId
//! log.rs    — ActionLog: append-only, sequence-numbered, lazily viewed
//! ```

pub mod action;
pub mod log;

pub use action::{signing_payload, Action, ActionId, SignedAction};
pub use log::{ActionLog, ActionLogConfig, LogError, LoggedAction, PendingIter, PendingView};
