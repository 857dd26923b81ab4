//! Append-only log of pending actions.
//!
//! Every accepted submission gets the next sequence number and stays in the
//! log until a settlement that folded it is accepted. The sequence number
//! *is* the ledger-delivery order: it is assigned under the same write lock
//! that inserts the entry, so concurrent appends serialize into one total
//! order, and that order is the order the proof generator replays.
//!
//! ## Design
//!
//! - `parking_lot::RwLock<BTreeMap<u64, LoggedAction>>` holds the entries.
//!   Readers (the pending view, the API) vastly outnumber writers.
//! - `DashMap` indices give lock-free duplicate detection and per-submitter
//!   counts on the submission hot path.
//! - [`PendingView`] is lazy: it remembers a bound, not a copy. Each step
//!   reads the next entry from the live map, so a view over ten thousand
//!   pending actions costs nothing until someone iterates it.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{DEFAULT_MAX_PENDING_ACTIONS, DEFAULT_MAX_PENDING_PER_SUBMITTER, DOMAIN_ACTION};
use crate::crypto::hash::domain_separated_hash_multi;
use crate::crypto::keys::Address;
use crate::storage::db::{DbError, NameDb};

use super::action::{ActionId, SignedAction};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable limits for the action log.
#[derive(Debug, Clone)]
pub struct ActionLogConfig {
    /// Maximum number of pending actions.
    pub max_pending: usize,

    /// Maximum pending actions per submitter address.
    pub max_per_submitter: usize,
}

impl Default for ActionLogConfig {
    fn default() -> Self {
        Self {
            max_pending: DEFAULT_MAX_PENDING_ACTIONS,
            max_per_submitter: DEFAULT_MAX_PENDING_PER_SUBMITTER,
        }
    }
}

// ---------------------------------------------------------------------------
// LoggedAction
// ---------------------------------------------------------------------------

/// A signed action with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedAction {
    pub seq: u64,
    pub id: ActionId,
    pub signed: SignedAction,
    pub delivered_at: DateTime<Utc>,
}

impl LoggedAction {
    pub fn new(seq: u64, signed: SignedAction) -> Self {
        Self {
            seq,
            id: signed.id(),
            signed,
            delivered_at: Utc::now(),
        }
    }

    /// Commitment to this entry's content *and* position. This is what the
    /// settlement proof binds, so reordering the log breaks the proof.
    pub fn digest(&self) -> [u8; 32] {
        domain_separated_hash_multi(
            DOMAIN_ACTION,
            &[b"logged".as_slice(), &self.seq.to_be_bytes()[..], &self.id.0[..]],
        )
    }
}

// ---------------------------------------------------------------------------
// LogError
// ---------------------------------------------------------------------------

/// Errors returned by action log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// An identical submission is already pending.
    #[error("action {0} is already pending")]
    Duplicate(ActionId),

    /// The log is at capacity.
    #[error("action log is full ({size} pending)")]
    LogFull { size: usize },

    /// The submitter already has too many pending actions.
    #[error("submitter {submitter} exceeded per-submitter limit of {limit}")]
    SubmitterLimitExceeded { submitter: Address, limit: usize },

    /// `retire` named a sequence number that isn't pending.
    #[error("no pending action with sequence {0}")]
    UnknownSequence(u64),

    /// Persistence failed; the in-memory log is unchanged.
    #[error("action log persistence failed: {0}")]
    Db(#[from] DbError),
}

// ---------------------------------------------------------------------------
// ActionLog
// ---------------------------------------------------------------------------

struct Entries {
    by_seq: BTreeMap<u64, LoggedAction>,
    next_seq: u64,
}

/// Thread-safe, append-only log of pending actions.
pub struct ActionLog {
    entries: RwLock<Entries>,
    ids: DashMap<ActionId, u64>,
    submitter_counts: DashMap<Address, usize>,
    db: Option<Arc<NameDb>>,
    config: ActionLogConfig,
}

impl fmt::Debug for ActionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionLog")
            .field("pending", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

impl ActionLog {
    /// In-memory log.
    pub fn new(config: ActionLogConfig) -> Self {
        Self {
            entries: RwLock::new(Entries {
                by_seq: BTreeMap::new(),
                next_seq: 0,
            }),
            ids: DashMap::new(),
            submitter_counts: DashMap::new(),
            db: None,
            config,
        }
    }

    /// Durable log. Reloads every retained action from `db` and continues
    /// numbering where the previous process stopped.
    pub fn open(config: ActionLogConfig, db: Arc<NameDb>) -> Result<Self, LogError> {
        let retained = db.load_actions()?;
        let stored_next = db.get_next_seq()?;

        let log = Self::new(config);
        {
            let mut entries = log.entries.write();
            for action in retained {
                log.index(&action);
                entries.next_seq = entries.next_seq.max(action.seq + 1);
                entries.by_seq.insert(action.seq, action);
            }
            entries.next_seq = entries.next_seq.max(stored_next);
            info!(
                pending = entries.by_seq.len(),
                next_seq = entries.next_seq,
                "action log reloaded"
            );
        }

        Ok(Self {
            db: Some(db),
            ..log
        })
    }

    /// Append a submission at the tip of the log.
    ///
    /// Checks, in order: duplicate id, total capacity, per-submitter limit.
    /// The entry is persisted before it becomes visible.
    pub fn append(&self, signed: SignedAction) -> Result<LoggedAction, LogError> {
        let id = signed.id();
        if self.ids.contains_key(&id) {
            return Err(LogError::Duplicate(id));
        }

        let mut entries = self.entries.write();

        // Re-check under the lock; two racing appends of the same id must
        // not both get in.
        if self.ids.contains_key(&id) {
            return Err(LogError::Duplicate(id));
        }
        if entries.by_seq.len() >= self.config.max_pending {
            return Err(LogError::LogFull {
                size: self.config.max_pending,
            });
        }
        let submitter = signed.submitter;
        let count = self
            .submitter_counts
            .get(&submitter)
            .map(|c| *c)
            .unwrap_or(0);
        if count >= self.config.max_per_submitter {
            return Err(LogError::SubmitterLimitExceeded {
                submitter,
                limit: self.config.max_per_submitter,
            });
        }

        let logged = LoggedAction::new(entries.next_seq, signed);
        if let Some(db) = &self.db {
            db.put_action(&logged)?;
        }

        self.index(&logged);
        entries.next_seq += 1;
        entries.by_seq.insert(logged.seq, logged.clone());

        debug!(
            seq = logged.seq,
            kind = logged.signed.action.kind(),
            submitter = %logged.signed.submitter,
            "action appended"
        );
        Ok(logged)
    }

    /// Lazy, finite, restartable view of everything pending right now.
    ///
    /// The view ends at the tip as of this call; actions appended later are
    /// not part of it. Actions retired while a view is alive are skipped.
    pub fn pending(&self) -> PendingView<'_> {
        let tip = self.entries.read().by_seq.keys().next_back().copied();
        PendingView { log: self, tip }
    }

    /// Actions delivered after `cursor` (exclusive), in log order.
    /// `None` starts from the beginning.
    pub fn since(&self, cursor: Option<u64>) -> Vec<LoggedAction> {
        let entries = self.entries.read();
        let lower = match cursor {
            Some(seq) => Excluded(seq),
            None => Unbounded,
        };
        entries
            .by_seq
            .range((lower, Unbounded))
            .map(|(_, a)| a.clone())
            .collect()
    }

    /// Remove exactly the listed entries. All-or-nothing: if any sequence
    /// number is not pending, nothing is removed.
    pub fn retire(&self, seqs: &[u64]) -> Result<usize, LogError> {
        let mut entries = self.entries.write();
        if let Some(missing) = seqs.iter().find(|s| !entries.by_seq.contains_key(s)) {
            return Err(LogError::UnknownSequence(*missing));
        }

        if let Some(db) = &self.db {
            db.remove_actions(seqs)?;
        }

        for seq in seqs {
            if let Some(action) = entries.by_seq.remove(seq) {
                self.unindex(&action);
            }
        }

        info!(
            retired = seqs.len(),
            remaining = entries.by_seq.len(),
            "settled actions retired"
        );
        Ok(seqs.len())
    }

    /// Drop a settled batch from memory. Its on-disk entries were removed
    /// in the transaction that committed the new root, so nothing here can
    /// fail once the root has advanced. Returns how many entries were held.
    pub fn retire_settled(&self, seqs: &[u64]) -> usize {
        let mut entries = self.entries.write();
        let mut removed = 0;
        for seq in seqs {
            if let Some(action) = entries.by_seq.remove(seq) {
                self.unindex(&action);
                removed += 1;
            }
        }
        info!(
            retired = removed,
            remaining = entries.by_seq.len(),
            "settled actions retired"
        );
        removed
    }

    pub fn get(&self, seq: u64) -> Option<LoggedAction> {
        self.entries.read().by_seq.get(&seq).cloned()
    }

    pub fn contains(&self, id: &ActionId) -> bool {
        self.ids.contains_key(id)
    }

    /// Pending actions for one submitter.
    pub fn pending_for(&self, submitter: &Address) -> usize {
        self.submitter_counts
            .get(submitter)
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.read().by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().by_seq.is_empty()
    }

    /// Sequence number the next append will receive.
    pub fn next_seq(&self) -> u64 {
        self.entries.read().next_seq
    }

    // -- Internal helpers ---------------------------------------------------

    fn index(&self, action: &LoggedAction) {
        self.ids.insert(action.id, action.seq);
        *self
            .submitter_counts
            .entry(action.signed.submitter)
            .or_insert(0) += 1;
    }

    fn unindex(&self, action: &LoggedAction) {
        self.ids.remove(&action.id);
        let now_zero = match self.submitter_counts.get_mut(&action.signed.submitter) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                *count == 0
            }
            None => false,
        };
        if now_zero {
            self.submitter_counts.remove(&action.signed.submitter);
        }
    }
}

// ---------------------------------------------------------------------------
// PendingView
// ---------------------------------------------------------------------------

/// A bounded window over the pending log. See [`ActionLog::pending`].
#[derive(Clone, Copy)]
pub struct PendingView<'a> {
    log: &'a ActionLog,
    tip: Option<u64>,
}

impl<'a> PendingView<'a> {
    /// Start a fresh pass from the oldest pending action.
    pub fn iter(&self) -> PendingIter<'a> {
        PendingIter {
            log: self.log,
            last: None,
            tip: self.tip,
        }
    }

    /// Highest sequence number inside the view.
    pub fn tip(&self) -> Option<u64> {
        self.tip
    }
}

impl<'a> IntoIterator for PendingView<'a> {
    type Item = LoggedAction;
    type IntoIter = PendingIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over a [`PendingView`].
pub struct PendingIter<'a> {
    log: &'a ActionLog,
    last: Option<u64>,
    tip: Option<u64>,
}

impl Iterator for PendingIter<'_> {
    type Item = LoggedAction;

    fn next(&mut self) -> Option<Self::Item> {
        let tip = self.tip?;
        let lower = match self.last {
            Some(seq) => Excluded(seq),
            None => Unbounded,
        };
        let entries = self.log.entries.read();
        let (seq, action) = entries.by_seq.range((lower, Unbounded)).next()?;
        if *seq > tip {
            return None;
        }
        self.last = Some(*seq);
        Some(action.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::crypto::keys::Keypair;
    use crate::names::{Name, NameRecord};

    fn kp(seed: u8) -> Keypair {
        Keypair::from_seed(&[seed; 32])
    }

    fn register(name: &str, signer: &Keypair, nonce: u64) -> SignedAction {
        let action = Action::Register {
            name: Name::parse(name).unwrap(),
            record: NameRecord::new(signer.address()),
        };
        SignedAction::sign(action, signer, nonce)
    }

    fn seqs(view: PendingView<'_>) -> Vec<u64> {
        view.iter().map(|a| a.seq).collect()
    }

    #[test]
    fn append_assigns_increasing_sequence() {
        let log = ActionLog::new(ActionLogConfig::default());
        let a = log.append(register("a", &kp(1), 0)).unwrap();
        let b = log.append(register("b", &kp(2), 0)).unwrap();
        assert_eq!(a.seq, 0);
        assert_eq!(b.seq, 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.next_seq(), 2);
    }

    #[test]
    fn duplicate_is_rejected() {
        let log = ActionLog::new(ActionLogConfig::default());
        let signed = register("a", &kp(1), 0);
        log.append(signed.clone()).unwrap();
        assert!(matches!(log.append(signed), Err(LogError::Duplicate(_))));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let log = ActionLog::new(ActionLogConfig {
            max_pending: 2,
            max_per_submitter: 10,
        });
        log.append(register("a", &kp(1), 0)).unwrap();
        log.append(register("b", &kp(1), 1)).unwrap();
        assert!(matches!(
            log.append(register("c", &kp(1), 2)),
            Err(LogError::LogFull { size: 2 })
        ));
    }

    #[test]
    fn per_submitter_limit_is_enforced() {
        let log = ActionLog::new(ActionLogConfig {
            max_pending: 100,
            max_per_submitter: 1,
        });
        log.append(register("a", &kp(1), 0)).unwrap();
        assert!(matches!(
            log.append(register("b", &kp(1), 1)),
            Err(LogError::SubmitterLimitExceeded { limit: 1, .. })
        ));
        // Someone else is unaffected.
        log.append(register("b", &kp(2), 0)).unwrap();
    }

    #[test]
    fn pending_is_ordered_and_restartable() {
        let log = ActionLog::new(ActionLogConfig::default());
        for i in 0..5u64 {
            log.append(register(&format!("n{i}"), &kp(1), i)).unwrap();
        }
        let view = log.pending();
        assert_eq!(seqs(view), vec![0, 1, 2, 3, 4]);
        // Same view, second pass.
        assert_eq!(seqs(view), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn pending_view_is_bounded_at_creation() {
        let log = ActionLog::new(ActionLogConfig::default());
        log.append(register("a", &kp(1), 0)).unwrap();
        let view = log.pending();
        log.append(register("b", &kp(1), 1)).unwrap();
        assert_eq!(seqs(view), vec![0]);
        assert_eq!(seqs(log.pending()), vec![0, 1]);
    }

    #[test]
    fn pending_view_of_empty_log_is_empty() {
        let log = ActionLog::new(ActionLogConfig::default());
        let view = log.pending();
        log.append(register("a", &kp(1), 0)).unwrap();
        assert!(view.iter().next().is_none());
        assert!(view.tip().is_none());
    }

    #[test]
    fn retire_removes_exactly_the_batch() {
        let log = ActionLog::new(ActionLogConfig::default());
        for i in 0..4u64 {
            log.append(register(&format!("n{i}"), &kp(1), i)).unwrap();
        }
        assert_eq!(log.retire(&[0, 1]).unwrap(), 2);
        assert_eq!(seqs(log.pending()), vec![2, 3]);
        assert_eq!(log.pending_for(&kp(1).address()), 2);

        // New appends keep counting from where we were.
        let next = log.append(register("late", &kp(1), 99)).unwrap();
        assert_eq!(next.seq, 4);
    }

    #[test]
    fn retire_is_all_or_nothing() {
        let log = ActionLog::new(ActionLogConfig::default());
        log.append(register("a", &kp(1), 0)).unwrap();
        log.append(register("b", &kp(1), 1)).unwrap();
        assert!(matches!(log.retire(&[0, 7]), Err(LogError::UnknownSequence(7))));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn retire_settled_skips_entries_already_gone() {
        let log = ActionLog::new(ActionLogConfig::default());
        for i in 0..3u64 {
            log.append(register(&format!("n{i}"), &kp(1), i)).unwrap();
        }
        assert_eq!(log.retire_settled(&[0, 1, 9]), 2);
        assert_eq!(seqs(log.pending()), vec![2]);
        assert_eq!(log.pending_for(&kp(1).address()), 1);
        assert_eq!(log.retire_settled(&[0, 1]), 0);
    }

    #[test]
    fn errors_render_their_cause() {
        let err = LogError::LogFull { size: 3 };
        assert_eq!(err.to_string(), "action log is full (3 pending)");
        assert_eq!(
            LogError::UnknownSequence(7).to_string(),
            "no pending action with sequence 7"
        );
    }

    #[test]
    fn retired_ids_can_be_resubmitted() {
        let log = ActionLog::new(ActionLogConfig::default());
        let signed = register("a", &kp(1), 0);
        log.append(signed.clone()).unwrap();
        log.retire(&[0]).unwrap();
        assert!(!log.contains(&signed.id()));
        assert_eq!(log.append(signed).unwrap().seq, 1);
        assert_eq!(log.pending_for(&kp(1).address()), 1);
    }

    #[test]
    fn since_returns_suffix() {
        let log = ActionLog::new(ActionLogConfig::default());
        for i in 0..4u64 {
            log.append(register(&format!("n{i}"), &kp(1), i)).unwrap();
        }
        let after: Vec<u64> = log.since(Some(1)).iter().map(|a| a.seq).collect();
        assert_eq!(after, vec![2, 3]);
        assert_eq!(log.since(None).len(), 4);
    }

    #[test]
    fn digest_binds_position() {
        let signed = register("a", &kp(1), 0);
        let first = LoggedAction::new(0, signed.clone());
        let second = LoggedAction::new(1, signed);
        assert_eq!(first.id, second.id);
        assert_ne!(first.digest(), second.digest());
    }

    #[test]
    fn concurrent_appends_get_unique_sequences() {
        let log = Arc::new(ActionLog::new(ActionLogConfig {
            max_pending: 1_000,
            max_per_submitter: 1_000,
        }));
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    let signer = kp(t + 1);
                    for i in 0..25u64 {
                        log.append(register(&format!("t{t}n{i}"), &signer, i))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(seqs(log.pending()), (0..100).collect::<Vec<u64>>());
    }

    #[test]
    fn durable_log_reloads() {
        let db = Arc::new(NameDb::open_temporary().unwrap());
        {
            let log = ActionLog::open(ActionLogConfig::default(), Arc::clone(&db)).unwrap();
            log.append(register("a", &kp(1), 0)).unwrap();
            log.append(register("b", &kp(1), 1)).unwrap();
            log.append(register("c", &kp(1), 2)).unwrap();
            log.retire(&[0]).unwrap();
        }
        let log = ActionLog::open(ActionLogConfig::default(), db).unwrap();
        assert_eq!(seqs(log.pending()), vec![1, 2]);
        assert_eq!(log.next_seq(), 3);
        assert_eq!(log.pending_for(&kp(1).address()), 2);
    }
}
