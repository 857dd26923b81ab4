//! # NameDb — Persistent Storage Engine
//!
//! The persistence layer for a directory instance, built on sled's
//! embedded key-value store. Only two things need to survive a restart:
//! the committed state (and therefore the committed root) and the
//! retained action log. Everything else is recomputed.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                 | Value                    |
//! |------------|---------------------|--------------------------|
//! | `actions`  | `seq` (8B BE)       | `bincode(LoggedAction)`  |
//! | `metadata` | key (UTF-8)         | value (bytes)            |
//!
//! Sequence numbers are stored as big-endian u64 so that sled's
//! lexicographic ordering matches log order and a plain `iter()` replays
//! the log in the order actions were delivered.
//!
//! ## Atomicity
//!
//! The committed snapshot and its root are written in a single `Batch`.
//! An accepted settlement writes the new snapshot and removes the settled
//! actions in one transaction across both trees, so a restart can never
//! find an advanced root with its batch still pending.

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Batch, Db, Transactional, Tree};
use std::path::Path;

use super::state::{Snapshot, StateRoot};
use crate::actions::LoggedAction;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_COMMITTED_STATE: &[u8] = b"committed_state";
const META_COMMITTED_ROOT: &[u8] = b"committed_root";
const META_NEXT_SEQ: &[u8] = b"next_action_seq";

// ---------------------------------------------------------------------------
// NameDb
// ---------------------------------------------------------------------------

/// Persistent storage for one directory instance.
///
/// # Thread Safety
///
/// sled trees support concurrent reads and serialized writes, so `NameDb`
/// is shared as `Arc<NameDb>` without extra locking.
#[derive(Debug, Clone)]
pub struct NameDb {
    db: Db,
    /// Pending actions keyed by sequence number.
    actions: Tree,
    /// Committed state, committed root, sequence counter.
    metadata: Tree,
}

impl NameDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let actions = db.open_tree("actions")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            actions,
            metadata,
        })
    }

    // -- Action log ---------------------------------------------------------

    /// Persist one logged action together with the next sequence number.
    pub fn put_action(&self, action: &LoggedAction) -> DbResult<()> {
        let bytes =
            bincode::serialize(action).map_err(|e| DbError::Serialization(e.to_string()))?;
        self.actions.insert(action.seq.to_be_bytes(), bytes)?;
        self.metadata
            .insert(META_NEXT_SEQ, &(action.seq + 1).to_be_bytes())?;
        self.db.flush()?;
        Ok(())
    }

    /// Remove a settled batch in one atomic write.
    pub fn remove_actions(&self, seqs: &[u64]) -> DbResult<()> {
        let mut batch = Batch::default();
        for seq in seqs {
            batch.remove(&seq.to_be_bytes());
        }
        self.actions.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Every retained action, in log order.
    pub fn load_actions(&self) -> DbResult<Vec<LoggedAction>> {
        let mut out = Vec::with_capacity(self.actions.len());
        for entry in self.actions.iter() {
            let (_key, value) = entry?;
            let action: LoggedAction =
                bincode::deserialize(&value).map_err(|e| DbError::Serialization(e.to_string()))?;
            out.push(action);
        }
        Ok(out)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    /// The sequence number the next appended action will get.
    ///
    /// Persisted separately from the actions so numbers are never reused,
    /// even after the whole log has been retired.
    pub fn get_next_seq(&self) -> DbResult<u64> {
        match self.metadata.get(META_NEXT_SEQ)? {
            Some(bytes) => Ok(u64::from_be_bytes(bytes.as_ref().try_into().map_err(
                |_| DbError::Corrupt("invalid sequence bytes".to_string()),
            )?)),
            None => Ok(0),
        }
    }

    // -- Committed state ----------------------------------------------------

    /// Persist the committed snapshot and its root atomically.
    pub fn put_committed(&self, snapshot: &Snapshot) -> DbResult<()> {
        let bytes =
            bincode::serialize(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;
        let mut batch = Batch::default();
        batch.insert(META_COMMITTED_STATE, bytes);
        batch.insert(META_COMMITTED_ROOT, &snapshot.root().0[..]);
        self.metadata.apply_batch(batch)?;
        self.db.flush()?;
        Ok(())
    }

    /// Persist the snapshot a settlement produced and remove the settled
    /// actions, in one transaction across `metadata` and `actions`.
    pub fn commit_settlement(&self, snapshot: &Snapshot, settled: &[u64]) -> DbResult<()> {
        let bytes =
            bincode::serialize(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;
        let root = snapshot.root();

        (&self.metadata, &self.actions)
            .transaction(|(metadata, actions)| {
                metadata.insert(META_COMMITTED_STATE, bytes.as_slice())?;
                metadata.insert(META_COMMITTED_ROOT, &root.0[..])?;
                for seq in settled {
                    actions.remove(&seq.to_be_bytes()[..])?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|e| match e {
                TransactionError::Storage(e) => DbError::Sled(e),
                TransactionError::Abort(()) => {
                    DbError::Corrupt("settlement transaction aborted".to_string())
                }
            })?;
        self.db.flush()?;
        Ok(())
    }

    /// Load the committed snapshot, checking it against the stored root.
    pub fn get_committed(&self) -> DbResult<Option<Snapshot>> {
        let Some(bytes) = self.metadata.get(META_COMMITTED_STATE)? else {
            return Ok(None);
        };
        let snapshot: Snapshot =
            bincode::deserialize(&bytes).map_err(|e| DbError::Serialization(e.to_string()))?;

        if let Some(root) = self.get_committed_root()? {
            if snapshot.root() != root {
                return Err(DbError::Corrupt(format!(
                    "stored state hashes to {}, stored root is {}",
                    snapshot.root(),
                    root
                )));
            }
        }
        Ok(Some(snapshot))
    }

    pub fn get_committed_root(&self) -> DbResult<Option<StateRoot>> {
        match self.metadata.get(META_COMMITTED_ROOT)? {
            Some(bytes) => {
                let arr: [u8; 32] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| DbError::Corrupt("invalid root bytes".to_string()))?;
                Ok(Some(StateRoot(arr)))
            }
            None => Ok(None),
        }
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
