//! # Merkle Allocation Library
//!
//! Off-chain half of the channel reward commitment scheme:
//! - `leaf`: fixed-layout Keccak leaf for one allocation record
//! - `tree`: sorted-pair Merkle tree that retains every level
//! - `proof`: authentication paths, verification and per-epoch trees
//! - `dataset_client` (feature `client`): participation datastore HTTP client
//!
//! The on-chain verifier in `claim-ledger` folds proofs through the same
//! functions, so both sides stay bit-exact.

pub mod leaf;
pub mod proof;
pub mod tree;
pub mod types;

#[cfg(feature = "client")]
pub mod dataset_client;

#[cfg(feature = "client")]
pub use dataset_client::{DatasetClient, DatasetClientError};
pub use leaf::{compute_leaf, derive_subject_id, hash_sorted_pair};
pub use proof::{fold_proof, verify_proof, ClaimProof, EpochTree, ProofError, ProofGenerator};
pub use tree::{MerkleTree, TreeBuilder};
pub use types::*;
