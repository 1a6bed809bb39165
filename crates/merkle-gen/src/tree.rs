//! Sorted-Pair Merkle Tree
//!
//! Builds the binary tree an epoch's root commits to, keeping every level so
//! proofs can be cut without rehashing.
//!
//! # Construction
//! 1. Level 0 is the ordered list of leaves (order fixes leaf indices)
//! 2. Adjacent nodes are paired and hashed with [`hash_sorted_pair`]
//! 3. An odd node out is promoted unchanged (never paired with itself)
//! 4. Repeat until one node remains
//!
//! Zero leaves commit to [`EMPTY_ROOT`]; a single leaf is its own root.

use crate::leaf::hash_sorted_pair;
use crate::proof::ProofError;
use crate::types::{preset, AllocationRecord, Hash, EMPTY_ROOT};
use std::collections::HashSet;

/// A fully materialized Merkle tree: `levels[0]` are the leaves, the last
/// level holds the root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MerkleTree {
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Build the tree over `leaves` in the given order.
    #[must_use]
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_sorted_pair(left, right),
                    [odd] => *odd,
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// The committed root ([`EMPTY_ROOT`] for an empty tree).
    #[must_use]
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|top| top.first())
            .copied()
            .unwrap_or(EMPTY_ROOT)
    }

    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Number of hashing levels above the leaves (upper bound on proof length).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    #[must_use]
    pub fn leaf(&self, index: usize) -> Option<Hash> {
        self.levels.first().and_then(|leaves| leaves.get(index)).copied()
    }

    #[must_use]
    pub fn levels(&self) -> &[Vec<Hash>] {
        &self.levels
    }
}

/// Validates an epoch's allocation records and folds them into a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeBuilder {
    max_leaves: usize,
}

impl TreeBuilder {
    /// Builder bounded by the ring slot bitmap (1024 claims).
    #[must_use]
    pub const fn ring() -> Self {
        Self {
            max_leaves: preset::CHANNEL_MAX_CLAIMS,
        }
    }

    /// Builder bounded by the epoch-state bitmap.
    #[must_use]
    pub const fn epoch() -> Self {
        Self {
            max_leaves: preset::MAX_EPOCH_CLAIMS,
        }
    }

    #[must_use]
    pub const fn with_max_leaves(max_leaves: usize) -> Self {
        Self { max_leaves }
    }

    #[must_use]
    pub const fn max_leaves(&self) -> usize {
        self.max_leaves
    }

    /// Check the records and build the tree.
    ///
    /// # Errors
    /// Fails if there are more records than the bitmap can track, if a
    /// record's `index` differs from its position, if an id exceeds
    /// `MAX_ID_BYTES`, or if a claimer appears twice.
    pub fn build(&self, records: &[AllocationRecord]) -> Result<MerkleTree, ProofError> {
        if records.len() > self.max_leaves {
            return Err(ProofError::TooManyLeaves(records.len(), self.max_leaves));
        }

        let mut claimers = HashSet::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if record.index as usize != position {
                return Err(ProofError::IndexMismatch {
                    position,
                    index: record.index,
                });
            }
            if record.id.len() > preset::MAX_ID_BYTES {
                return Err(ProofError::IdTooLong(record.id.len(), preset::MAX_ID_BYTES));
            }
            if !claimers.insert(record.claimer) {
                return Err(ProofError::DuplicateClaimer(record.claimer));
            }
        }

        Ok(MerkleTree::from_leaves(
            records.iter().map(AllocationRecord::leaf).collect(),
        ))
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::ring()
    }
}
