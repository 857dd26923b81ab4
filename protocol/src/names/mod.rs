//! # Directory Data Model
//!
//! The three value types the directory is made of:
//!
//! ```text
//! name.rs     — Name: normalized fixed-width identifier (one field element)
//! record.rs   — NameRecord: owner address + avatar / url references
//! premium.rs  — PremiumSchedule: fee multiplier per name-length bucket
//! ```

pub mod name;
pub mod premium;
pub mod record;

pub use name::{Name, NameError};
pub use premium::PremiumSchedule;
pub use record::NameRecord;
