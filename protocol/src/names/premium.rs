//! Length-bucketed registration pricing.
//!
//! | bucket | name length | default multiplier |
//! |--------|-------------|--------------------|
//! | 0      | <= 3        | 1                  |
//! | 1      | 4           | 1                  |
//! | 2      | 5           | 1                  |
//! | 3      | 6           | 1                  |
//! | 4      | 7           | 1                  |
//! | 5      | >= 8        | 1                  |
//!
//! The schedule is part of the committed state. It changes only through a
//! `set_premium` action folded in a settlement, and the fee for a
//! registration is evaluated against whatever schedule is in force at the
//! point that registration is replayed.

use serde::{Deserialize, Serialize};

use crate::config::{BASE_REGISTRATION_FEE, DEFAULT_PREMIUM_MULTIPLIER, PREMIUM_BUCKETS};

use super::name::Name;

/// Fee multipliers indexed by length bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumSchedule([u64; PREMIUM_BUCKETS]);

impl Default for PremiumSchedule {
    fn default() -> Self {
        Self([DEFAULT_PREMIUM_MULTIPLIER; PREMIUM_BUCKETS])
    }
}

impl PremiumSchedule {
    pub fn new(multipliers: [u64; PREMIUM_BUCKETS]) -> Self {
        Self(multipliers)
    }

    pub fn multipliers(&self) -> &[u64; PREMIUM_BUCKETS] {
        &self.0
    }

    /// Which bucket a name of `len` characters falls into.
    pub fn bucket_for_len(len: usize) -> usize {
        len.saturating_sub(3).min(PREMIUM_BUCKETS - 1)
    }

    /// The multiplier applied to names of `len` characters.
    pub fn rate(&self, len: usize) -> u64 {
        self.0[Self::bucket_for_len(len)]
    }

    /// Total registration fee for `name` under this schedule.
    pub fn fee_for(&self, name: &Name) -> u64 {
        BASE_REGISTRATION_FEE.saturating_mul(self.rate(name.len()))
    }

    /// Fixed-width encoding committed into the state tree.
    pub fn canonical_bytes(&self) -> [u8; PREMIUM_BUCKETS * 8] {
        let mut out = [0u8; PREMIUM_BUCKETS * 8];
        for (chunk, m) in out.chunks_exact_mut(8).zip(self.0.iter()) {
            chunk.copy_from_slice(&m.to_be_bytes());
        }
        out
    }
}
