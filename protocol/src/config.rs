//! # Protocol Configuration & Constants
//!
//! Every magic number in nameledger lives here. If you're hardcoding a
//! constant somewhere else, you're doing it wrong.
//!
//! Some of these values are baked into committed roots (name width, the
//! number of premium buckets, hashing domains). Changing those after the
//! first settlement invalidates every root on the ledger, so treat this
//! file as append-mostly.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Full protocol version string.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Fingerprint mixed into signed submissions so a signature produced for
/// one deployment family can't be replayed against another.
pub const PROTOCOL_FINGERPRINT: &str = "nameledger-2026";

// ---------------------------------------------------------------------------
// Names & Records
// ---------------------------------------------------------------------------

/// Maximum encoded name length in bytes.
///
/// 31 bytes plus the length prefix fill exactly one 32-byte word, and 31
/// bytes always fit below the BN254 scalar modulus, so a name packs into a
/// single field element without reduction.
pub const MAX_NAME_LENGTH: usize = 31;

/// Width of the packed name encoding: one length byte plus the padded body.
pub const NAME_ENCODED_LENGTH: usize = MAX_NAME_LENGTH + 1;

/// Upper bound on each auxiliary record field (avatar / URL references).
pub const MAX_RECORD_FIELD_LENGTH: usize = 256;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Number of length buckets in the premium schedule:
/// `[<=3, 4, 5, 6, 7, >=8]` characters.
pub const PREMIUM_BUCKETS: usize = 6;

/// Base fee charged for any registration before the premium multiplier.
pub const BASE_REGISTRATION_FEE: u64 = 1_000;

/// Multiplier every bucket carries in a freshly deployed directory.
pub const DEFAULT_PREMIUM_MULTIPLIER: u64 = 1;

// ---------------------------------------------------------------------------
// Action Log
// ---------------------------------------------------------------------------

/// Maximum number of pending (unsettled) actions the log will hold.
pub const DEFAULT_MAX_PENDING_ACTIONS: usize = 10_000;

/// Maximum pending actions per submitter. Stops one key from filling
/// every batch.
pub const DEFAULT_MAX_PENDING_PER_SUBMITTER: usize = 256;

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

/// Upper bound on how many actions go into one settlement proof. Proving
/// cost is linear in the batch, so this bounds a single cycle's latency.
pub const MAX_SETTLEMENT_BATCH: usize = 16;

/// Default delay between two scheduler cycles, in milliseconds.
pub const DEFAULT_RETRY_WAIT_MS: u64 = 60_000;

/// The scheduler settles as soon as this many actions are pending.
pub const MIN_ACTIONS_TO_SETTLE: usize = 6;

/// ...or once it has waited this many cycles with a non-empty backlog.
pub const MAX_RETRIES_BEFORE_SETTLE: u32 = 100;

/// Convenience wrapper for [`DEFAULT_RETRY_WAIT_MS`].
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(DEFAULT_RETRY_WAIT_MS);

// ---------------------------------------------------------------------------
// Hashing Domains
// ---------------------------------------------------------------------------

/// BLAKE3 derive-key contexts. Each commitment we produce lives in its own
/// domain so a leaf can never be confused with an inner node, an action
/// digest, or a signature payload.
pub const DOMAIN_SMT_LEAF: &str = "nameledger 2026 smt leaf";
pub const DOMAIN_SMT_NODE: &str = "nameledger 2026 smt node";
pub const DOMAIN_SMT_EMPTY: &str = "nameledger 2026 smt empty";
pub const DOMAIN_ACTION: &str = "nameledger 2026 action digest";
pub const DOMAIN_SIGNING: &str = "nameledger 2026 signed submission";
pub const DOMAIN_NAME_KEY: &str = "nameledger 2026 name key";
pub const DOMAIN_RESERVED_KEY: &str = "nameledger 2026 reserved state key";
pub const DOMAIN_MIMC_CONSTANTS: &str = "nameledger 2026 mimc round constants";

/// Depth of the sparse Merkle tree. One level per key bit.
pub const SMT_DEPTH: usize = 256;

/// Rounds of the x^5 permutation used in the settlement circuit.
pub const MIMC_ROUNDS: usize = 32;
