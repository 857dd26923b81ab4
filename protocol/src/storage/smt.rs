//! # Sparse Merkle Tree
//!
//! A binary Merkle tree over the full 256-bit keyspace. Every key has a
//! fixed leaf position (its bits, most significant first, pick left/right
//! at each level), so the root depends only on the set of `(key, value)`
//! pairs and never on insertion order. That is what lets two independent
//! replays of the same batch agree on a root byte-for-byte.
//!
//! ## Hashing
//!
//! ```text
//! leaf(key, value)  = BLAKE3-derive("smt leaf", key || value)
//! node(left, right) = BLAKE3-derive("smt node", left || right)
//! empty[256]        = BLAKE3-derive("smt empty", "")
//! empty[d]          = node(empty[d+1], empty[d+1])
//! ```
//!
//! Only non-empty nodes are stored. A subtree with no leaves is implicitly
//! `empty[depth]`, so a tree holding `n` keys costs `O(256 * n)` memory and
//! each update rehashes exactly one root-to-leaf path.
//!
//! ## Proofs
//!
//! [`MerkleProof`] carries the sibling path for a key, compressed with a
//! bitmap: siblings equal to the empty-subtree hash are omitted. The same
//! proof shape covers inclusion (`value = Some`) and exclusion
//! (`value = None`).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::config::{DOMAIN_SMT_EMPTY, DOMAIN_SMT_LEAF, DOMAIN_SMT_NODE, SMT_DEPTH};
use crate::crypto::hash::{domain_separated_hash, domain_separated_hash_multi};

type Hash = [u8; 32];

// ---------------------------------------------------------------------------
// Hash helpers
// ---------------------------------------------------------------------------

fn leaf_hash(key: &Hash, value: &Hash) -> Hash {
    domain_separated_hash_multi(DOMAIN_SMT_LEAF, &[key.as_slice(), value.as_slice()])
}

fn node_hash(left: &Hash, right: &Hash) -> Hash {
    domain_separated_hash_multi(DOMAIN_SMT_NODE, &[left.as_slice(), right.as_slice()])
}

/// `empty[d]` is the root of an empty subtree whose top sits at depth `d`.
fn empty_hashes() -> &'static [Hash] {
    static EMPTY: OnceLock<Vec<Hash>> = OnceLock::new();
    EMPTY.get_or_init(|| {
        let mut hashes = vec![[0u8; 32]; SMT_DEPTH + 1];
        hashes[SMT_DEPTH] = domain_separated_hash(DOMAIN_SMT_EMPTY, b"");
        for depth in (0..SMT_DEPTH).rev() {
            hashes[depth] = node_hash(&hashes[depth + 1], &hashes[depth + 1]);
        }
        hashes
    })
}

/// Root of a tree with no leaves.
pub fn empty_root() -> Hash {
    empty_hashes()[0]
}

/// Bit `index` of `key`, MSB first.
fn bit(key: &Hash, index: usize) -> u8 {
    (key[index / 8] >> (7 - index % 8)) & 1
}

/// `key` with every bit at position `>= depth` cleared. Identifies the node
/// at `depth` on the path to `key`.
fn prefix(key: &Hash, depth: usize) -> Hash {
    let mut out = [0u8; 32];
    let full = depth / 8;
    out[..full].copy_from_slice(&key[..full]);
    let rem = depth % 8;
    if rem > 0 {
        out[full] = key[full] & (0xFFu8 << (8 - rem));
    }
    out
}

/// Prefix of the sibling of the node at `depth` on the path to `key`.
fn sibling_prefix(key: &Hash, depth: usize) -> Hash {
    let mut out = prefix(key, depth);
    let index = depth - 1;
    out[index / 8] ^= 1 << (7 - index % 8);
    out
}

// ---------------------------------------------------------------------------
// SparseMerkleTree
// ---------------------------------------------------------------------------

/// In-memory sparse Merkle tree mapping 32-byte keys to 32-byte value hashes.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SparseMerkleTree {
    /// key -> value hash, for lookups and proof construction.
    leaves: BTreeMap<Hash, Hash>,
    /// Non-empty nodes keyed by `(depth, prefix)`.
    nodes: HashMap<(u16, Hash), Hash>,
}

impl SparseMerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current root hash.
    pub fn root(&self) -> Hash {
        self.node(0, &[0u8; 32])
    }

    /// Value hash stored under `key`, if any.
    pub fn get(&self, key: &Hash) -> Option<&Hash> {
        self.leaves.get(key)
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Insert or overwrite the value hash at `key`.
    pub fn insert(&mut self, key: Hash, value: Hash) {
        self.leaves.insert(key, value);
        self.update_path(&key, leaf_hash(&key, &value));
    }

    /// Remove `key`, returning its previous value hash.
    pub fn remove(&mut self, key: &Hash) -> Option<Hash> {
        let previous = self.leaves.remove(key)?;
        self.update_path(key, empty_hashes()[SMT_DEPTH]);
        Some(previous)
    }

    /// Build an inclusion (or exclusion) proof for `key` against the current root.
    pub fn prove(&self, key: &Hash) -> MerkleProof {
        let empty = empty_hashes();
        let mut bitmap = [0u8; 32];
        let mut siblings = Vec::new();

        for level in 0..SMT_DEPTH {
            let depth = SMT_DEPTH - level;
            let sibling = self.node(depth, &sibling_prefix(key, depth));
            if sibling != empty[depth] {
                bitmap[level / 8] |= 1 << (level % 8);
                siblings.push(sibling);
            }
        }

        MerkleProof {
            key: *key,
            value: self.leaves.get(key).copied(),
            bitmap,
            siblings,
        }
    }

    fn node(&self, depth: usize, prefix: &Hash) -> Hash {
        self.nodes
            .get(&(depth as u16, *prefix))
            .copied()
            .unwrap_or(empty_hashes()[depth])
    }

    fn set_node(&mut self, depth: usize, prefix: Hash, hash: Hash) {
        if hash == empty_hashes()[depth] {
            self.nodes.remove(&(depth as u16, prefix));
        } else {
            self.nodes.insert((depth as u16, prefix), hash);
        }
    }

    /// Rehash the path from the leaf at `key` up to the root.
    fn update_path(&mut self, key: &Hash, leaf: Hash) {
        let mut current = leaf;
        let mut depth = SMT_DEPTH;
        self.set_node(depth, prefix(key, depth), current);

        while depth > 0 {
            let sibling = self.node(depth, &sibling_prefix(key, depth));
            current = if bit(key, depth - 1) == 0 {
                node_hash(&current, &sibling)
            } else {
                node_hash(&sibling, &current)
            };
            depth -= 1;
            self.set_node(depth, prefix(key, depth), current);
        }
    }
}

impl fmt::Debug for SparseMerkleTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMerkleTree")
            .field("leaves", &self.leaves.len())
            .field("nodes", &self.nodes.len())
            .field("root", &hex::encode(self.root()))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// MerkleProof
// ---------------------------------------------------------------------------

/// Compressed Merkle path for one key.
///
/// Bit `i` of `bitmap` (little-endian within each byte) is set when the
/// sibling `i` levels above the leaf is non-empty; those siblings appear in
/// `siblings` bottom-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub key: Hash,
    pub value: Option<Hash>,
    pub bitmap: [u8; 32],
    pub siblings: Vec<Hash>,
}

impl MerkleProof {
    /// `true` when the proof recomputes exactly `root`.
    pub fn verify(&self, root: &Hash) -> bool {
        let empty = empty_hashes();
        let mut current = match &self.value {
            Some(value) => leaf_hash(&self.key, value),
            None => empty[SMT_DEPTH],
        };
        let mut siblings = self.siblings.iter();

        for level in 0..SMT_DEPTH {
            let depth = SMT_DEPTH - level;
            let sibling = if self.bitmap[level / 8] & (1 << (level % 8)) != 0 {
                match siblings.next() {
                    Some(s) => *s,
                    None => return false,
                }
            } else {
                empty[depth]
            };
            current = if bit(&self.key, depth - 1) == 0 {
                node_hash(&current, &sibling)
            } else {
                node_hash(&sibling, &current)
            };
        }

        siblings.next().is_none() && current == *root
    }

    /// `true` when this proof asserts the key is absent.
    pub fn is_exclusion(&self) -> bool {
        self.value.is_none()
    }
}
