//! Claim Verification
//!
//! A claim is accepted only if
//! 1. the leaf recomputed from `(claimer, index, amount, id)` folds through
//!    the submitted proof to the stored root, and
//! 2. bit `index` of the claim bitmap is still unset.
//!
//! Verification is read-only. [`settle`] moves the funds first and flips the
//! bit only once the transfer succeeded; the caller writes the account back
//! afterwards, so a failed claim leaves nothing behind.

use crate::constants::{MAX_ID_BYTES, MAX_PROOF_NODES};
use crate::error::LedgerError;
use crate::token::{TokenTransfer, TransferReceipt};
use borsh::{BorshDeserialize, BorshSerialize};
use merkle_gen::{compute_leaf, fold_proof, Address, Hash};
use serde::{Deserialize, Serialize};

/// Fixed-capacity record of redeemed leaf indices.
pub trait ClaimBitmap {
    /// Number of indices the bitmap can track.
    fn capacity(&self) -> usize;

    fn bits(&self) -> &[u8];

    fn bits_mut(&mut self) -> &mut [u8];

    fn is_claimed(&self, index: usize) -> bool {
        index < self.capacity() && self.bits()[index / 8] & (1 << (index % 8)) != 0
    }

    /// # Errors
    /// [`LedgerError::InvalidIndex`] past capacity, [`LedgerError::AlreadyClaimed`]
    /// if the bit is already set.
    fn ensure_claimable(&self, index: u32) -> Result<(), LedgerError> {
        let position = index as usize;
        if position >= self.capacity() {
            return Err(LedgerError::InvalidIndex {
                index,
                capacity: self.capacity(),
            });
        }
        if self.is_claimed(position) {
            return Err(LedgerError::AlreadyClaimed);
        }
        Ok(())
    }

    /// # Errors
    /// Same as [`ClaimBitmap::ensure_claimable`].
    fn set_claimed(&mut self, index: u32) -> Result<(), LedgerError> {
        self.ensure_claimable(index)?;
        let position = index as usize;
        self.bits_mut()[position / 8] |= 1 << (position % 8);
        Ok(())
    }

    fn claimed_count(&self) -> usize {
        self.bits().iter().map(|b| b.count_ones() as usize).sum()
    }
}

/// Arguments a claimer submits; the claimer itself is the caller identity.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub epoch: u64,
    pub index: u32,
    pub amount: u64,
    pub id: String,
    #[serde(with = "merkle_gen::proof_vec_serde")]
    pub proof: Vec<Hash>,
}

impl ClaimRequest {
    #[must_use]
    pub fn leaf(&self, claimer: &Address) -> Hash {
        compute_leaf(claimer, self.index, self.amount, &self.id)
    }

    /// # Errors
    /// Rejects an oversized id or proof before any hashing.
    pub fn check_bounds(&self) -> Result<(), LedgerError> {
        if self.id.len() > MAX_ID_BYTES {
            return Err(LedgerError::InvalidInputLength(self.id.len()));
        }
        if self.proof.len() > MAX_PROOF_NODES {
            return Err(LedgerError::InvalidProofLength(self.proof.len()));
        }
        Ok(())
    }
}

impl From<merkle_gen::ClaimProof> for ClaimRequest {
    fn from(bundle: merkle_gen::ClaimProof) -> Self {
        Self {
            epoch: 0,
            index: bundle.index,
            amount: bundle.amount,
            id: bundle.id,
            proof: bundle.proof,
        }
    }
}

/// Check `request` from `claimer` against `root` and `bitmap` without mutating.
///
/// # Errors
/// `InvalidInputLength`/`InvalidProofLength` for oversized input,
/// `InvalidIndex` past the bitmap, `InvalidProof` when the recomputed root
/// differs, then `AlreadyClaimed` if the bit is set.
pub fn verify_claim<B: ClaimBitmap + ?Sized>(
    claimer: &Address,
    request: &ClaimRequest,
    root: &Hash,
    bitmap: &B,
) -> Result<(), LedgerError> {
    request.check_bounds()?;

    if request.index as usize >= bitmap.capacity() {
        return Err(LedgerError::InvalidIndex {
            index: request.index,
            capacity: bitmap.capacity(),
        });
    }

    if fold_proof(&request.proof, request.leaf(claimer)) != *root {
        return Err(LedgerError::InvalidProof);
    }

    bitmap.ensure_claimable(request.index)
}

/// Pay a verified claim from `treasury` and mark its index consumed.
///
/// # Errors
/// Propagates bitmap and transfer failures; the bitmap is untouched in
/// either case.
pub fn settle<B, T>(
    tokens: &mut T,
    treasury: &Address,
    claimer: &Address,
    request: &ClaimRequest,
    bitmap: &mut B,
) -> Result<TransferReceipt, LedgerError>
where
    B: ClaimBitmap + ?Sized,
    T: TokenTransfer + ?Sized,
{
    bitmap.ensure_claimable(request.index)?;
    let receipt = tokens.transfer(treasury, claimer, request.amount)?;
    bitmap.set_claimed(request.index)?;
    Ok(receipt)
}
