//! Cumulative channels: one current root, advanced by sequence number.
//!
//! Only the latest epoch is claimable. Its claim bitmap lives in the open
//! epoch-state account created alongside each publish.

use crate::account::AccountLayout;
use crate::constants::CUMULATIVE_CHANNEL_VERSION;
use crate::error::LedgerError;
use borsh::{BorshDeserialize, BorshSerialize};
use merkle_gen::{Address, Hash, EMPTY_ROOT};

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct CumulativeChannel {
    pub version: u8,
    pub bump: u8,
    pub mint: Address,
    pub subject: Address,
    /// Number of roots published so far
    pub root_seq: u64,
    /// Epoch of the current root; 0 before the first publish
    pub epoch: u64,
    pub root: Hash,
}

impl AccountLayout for CumulativeChannel {
    const NAME: &'static str = "CumulativeChannel";
}

impl CumulativeChannel {
    pub const LEN: usize = 8 + 1 + 1 + 32 + 32 + 8 + 8 + 32;

    #[must_use]
    pub fn new(mint: Address, subject: Address, bump: u8) -> Self {
        Self {
            version: CUMULATIVE_CHANNEL_VERSION,
            bump,
            mint,
            subject,
            root_seq: 0,
            epoch: 0,
            root: EMPTY_ROOT,
        }
    }

    /// Replace the current root. Returns the new sequence number.
    ///
    /// # Errors
    /// [`LedgerError::InvalidEpoch`] for epoch 0,
    /// [`LedgerError::EpochNotIncreasing`] unless `epoch` is past the current
    /// one, [`LedgerError::MathOverflow`] if the sequence would wrap.
    pub fn publish(&mut self, epoch: u64, root: Hash) -> Result<u64, LedgerError> {
        if epoch == 0 {
            return Err(LedgerError::InvalidEpoch);
        }
        if epoch <= self.epoch {
            return Err(LedgerError::EpochNotIncreasing {
                epoch,
                resident: self.epoch,
            });
        }
        let root_seq = self.root_seq.checked_add(1).ok_or(LedgerError::MathOverflow)?;

        self.root_seq = root_seq;
        self.epoch = epoch;
        self.root = root;
        Ok(root_seq)
    }

    /// Current root, if `epoch` is the claimable one.
    ///
    /// # Errors
    /// [`LedgerError::SlotEpochMismatch`] for a superseded epoch,
    /// [`LedgerError::EpochNotFound`] for one not yet published.
    pub fn claimable_root(&self, epoch: u64) -> Result<Hash, LedgerError> {
        if self.epoch != 0 && epoch == self.epoch {
            Ok(self.root)
        } else if epoch != 0 && epoch < self.epoch {
            Err(LedgerError::SlotEpochMismatch {
                requested: epoch,
                resident: self.epoch,
            })
        } else {
            Err(LedgerError::EpochNotFound(epoch))
        }
    }
}
