//! Merkle proof generation and verification for allocation claims.
//!
//! A proof is the list of sibling hashes on the path from a leaf to the root,
//! bottom-up. Levels where the path node was promoted without a sibling
//! contribute nothing, so proof length varies between leaves of one tree.
//! Because interior nodes are sorted-pair hashes, the proof carries no
//! direction bits.

use crate::leaf::hash_sorted_pair;
use crate::tree::{MerkleTree, TreeBuilder};
use crate::types::{preset, proof_vec_serde, Address, AllocationRecord, Hash};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur while building trees or generating proofs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("Leaf index {0} out of bounds (leaf count {1})")]
    LeafIndexOutOfBounds(usize, usize),

    #[error("Record at position {position} carries index {index}")]
    IndexMismatch { position: usize, index: u32 },

    #[error("Too many leaves: {0} (max {1})")]
    TooManyLeaves(usize, usize),

    #[error("Allocation id is {0} bytes (max {1})")]
    IdTooLong(usize, usize),

    #[error("Claimer {0} appears more than once")]
    DuplicateClaimer(Address),

    #[error("Claimer {0} has no allocation in this epoch")]
    ClaimerNotFound(Address),

    #[error(
        "Local root {} does not match published root {}",
        hex::encode(.local),
        hex::encode(.published)
    )]
    RootMismatch { local: Hash, published: Hash },
}

/// Extracts authentication paths from a retained tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofGenerator;

impl ProofGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sibling path for the leaf at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is not a leaf of `tree`.
    pub fn prove(&self, tree: &MerkleTree, index: usize) -> Result<Vec<Hash>, ProofError> {
        if index >= tree.leaf_count() {
            return Err(ProofError::LeafIndexOutOfBounds(index, tree.leaf_count()));
        }

        let mut proof = Vec::with_capacity(tree.depth());
        let mut position = index;
        // the root level has no siblings
        for level in tree.levels().iter().take(tree.depth()) {
            if let Some(sibling) = level.get(position ^ 1) {
                proof.push(*sibling);
            }
            position /= 2;
        }
        Ok(proof)
    }
}

/// Fold `leaf` up through `proof` with sorted-pair hashing.
#[must_use]
pub fn fold_proof(proof: &[Hash], leaf: Hash) -> Hash {
    proof
        .iter()
        .fold(leaf, |node, sibling| hash_sorted_pair(&node, sibling))
}

/// Check that `leaf` and `proof` reproduce `root`.
#[must_use]
pub fn verify_proof(proof: &[Hash], leaf: Hash, root: Hash) -> bool {
    proof.len() <= preset::MAX_PROOF_NODES && fold_proof(proof, leaf) == root
}

/// Everything a claimer submits for one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    pub claimer: Address,
    pub index: u32,
    pub amount: u64,
    pub id: String,

    /// Sibling hashes, leaf level first
    #[serde(with = "proof_vec_serde")]
    pub proof: Vec<Hash>,

    /// Root the proof folds to
    #[serde(with = "crate::types::hex_bytes32")]
    pub root: Hash,
}

impl ClaimProof {
    #[must_use]
    pub fn leaf(&self) -> Hash {
        crate::leaf::compute_leaf(&self.claimer, self.index, self.amount, &self.id)
    }

    #[must_use]
    pub fn verify(&self) -> bool {
        verify_proof(&self.proof, self.leaf(), self.root)
    }
}

/// One epoch's records together with the tree built over them.
#[derive(Debug, Clone)]
pub struct EpochTree {
    records: Vec<AllocationRecord>,
    tree: MerkleTree,
    by_claimer: HashMap<Address, usize>,
}

impl EpochTree {
    /// Validate `records` with `builder` and build the tree.
    ///
    /// # Errors
    /// Propagates [`TreeBuilder::build`] validation errors.
    pub fn build(
        builder: &TreeBuilder,
        records: Vec<AllocationRecord>,
    ) -> Result<Self, ProofError> {
        let tree = builder.build(&records)?;
        let by_claimer = records
            .iter()
            .enumerate()
            .map(|(position, record)| (record.claimer, position))
            .collect();
        Ok(Self {
            records,
            tree,
            by_claimer,
        })
    }

    #[must_use]
    pub fn root(&self) -> Hash {
        self.tree.root()
    }

    #[must_use]
    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    #[must_use]
    pub fn records(&self) -> &[AllocationRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total amount allocated across all records.
    #[must_use]
    pub fn total_amount(&self) -> u128 {
        self.records.iter().map(|r| u128::from(r.amount)).sum()
    }

    /// Claim bundle for the record at `index`.
    ///
    /// # Errors
    /// Returns an error if `index` is out of range.
    pub fn proof_for_index(&self, index: usize) -> Result<ClaimProof, ProofError> {
        let record = self
            .records
            .get(index)
            .ok_or(ProofError::LeafIndexOutOfBounds(index, self.records.len()))?;
        let proof = ProofGenerator::new().prove(&self.tree, index)?;

        Ok(ClaimProof {
            claimer: record.claimer,
            index: record.index,
            amount: record.amount,
            id: record.id.clone(),
            proof,
            root: self.root(),
        })
    }

    /// Claim bundle for `claimer`.
    ///
    /// # Errors
    /// Returns [`ProofError::ClaimerNotFound`] if the claimer has no record.
    pub fn proof_for_claimer(&self, claimer: &Address) -> Result<ClaimProof, ProofError> {
        let index = self
            .by_claimer
            .get(claimer)
            .copied()
            .ok_or(ProofError::ClaimerNotFound(*claimer))?;
        self.proof_for_index(index)
    }

    /// Compare the locally built root with the root stored on-chain.
    ///
    /// # Errors
    /// Returns [`ProofError::RootMismatch`] if they differ; proofs from this
    /// tree would then be rejected by the verifier.
    pub fn ensure_matches(&self, published: &Hash) -> Result<(), ProofError> {
        let local = self.root();
        if local == *published {
            Ok(())
        } else {
            Err(ProofError::RootMismatch {
                local,
                published: *published,
            })
        }
    }
}
