//! Leaf Encoding
//!
//! `leaf = keccak256(claimer(32) || index_u32_le(4) || amount_u64_le(8) || id_utf8)`
//!
//! The id has no length prefix: its length is implied by the hash input. The
//! on-chain verifier recomputes this independently, so the layout is frozen.

use crate::types::{Address, Hash};
use sha3::{Digest, Keccak256};

/// Keccak-256 over the concatenation of `parts`.
#[must_use]
pub fn keccak_hashv(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Leaf hash for one allocation record.
#[must_use]
pub fn compute_leaf(claimer: &Address, index: u32, amount: u64, id: &str) -> Hash {
    keccak_hashv(&[
        claimer.as_ref(),
        &index.to_le_bytes(),
        &amount.to_le_bytes(),
        id.as_bytes(),
    ])
}

/// Interior node: the two children are ordered bytewise before hashing, so
/// proofs carry no left/right direction bits.
#[must_use]
pub fn hash_sorted_pair(a: &Hash, b: &Hash) -> Hash {
    if a <= b {
        keccak_hashv(&[a, b])
    } else {
        keccak_hashv(&[b, a])
    }
}

/// Stable subject id for a named channel: `keccak("channel:" || lowercase(name))`.
#[must_use]
pub fn derive_subject_id(channel: &str) -> Address {
    let lower = channel.to_ascii_lowercase();
    Address(keccak_hashv(&[b"channel:", lower.as_bytes()]))
}
