//! Channel Ring State
//!
//! Each ring channel keeps the roots of its last `CHANNEL_RING_SLOTS` epochs
//! in a fixed array. Epoch `e` lives in slot `e % CHANNEL_RING_SLOTS` until a
//! later epoch mapping to the same slot replaces it, which also wipes the
//! slot's claim bitmap.
//!
//! Layout: `discriminator(8) | version(1) | bump(1) | mint(32) | subject(32) |
//! latest_epoch(8) | slot × 10`, slot = `epoch(8) | root(32) | bitmap(128)`.

use crate::account::AccountLayout;
use crate::constants::{
    CHANNEL_BITMAP_BYTES, CHANNEL_MAX_CLAIMS, CHANNEL_RING_SLOTS, CHANNEL_STATE_VERSION,
};
use crate::error::LedgerError;
use crate::verifier::ClaimBitmap;
use borsh::{BorshDeserialize, BorshSerialize};
use merkle_gen::{Address, Hash};

/// One epoch cell of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChannelSlot {
    /// Resident epoch; 0 marks an empty slot
    pub epoch: u64,
    pub root: Hash,
    pub claimed_bitmap: [u8; CHANNEL_BITMAP_BYTES],
}

/// Observable condition of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Unclaimed,
    PartiallyClaimed,
}

impl ChannelSlot {
    pub const EMPTY: Self = Self {
        epoch: 0,
        root: [0u8; 32],
        claimed_bitmap: [0u8; CHANNEL_BITMAP_BYTES],
    };

    pub const LEN: usize = 8 + 32 + CHANNEL_BITMAP_BYTES;

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.epoch == 0
    }

    #[must_use]
    pub fn state(&self) -> SlotState {
        if self.is_empty() {
            SlotState::Empty
        } else if self.claimed_bitmap.iter().all(|b| *b == 0) {
            SlotState::Unclaimed
        } else {
            SlotState::PartiallyClaimed
        }
    }

    fn reset(&mut self, epoch: u64, root: Hash) {
        self.epoch = epoch;
        self.root = root;
        self.claimed_bitmap = [0u8; CHANNEL_BITMAP_BYTES];
    }
}

impl Default for ChannelSlot {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl ClaimBitmap for ChannelSlot {
    fn capacity(&self) -> usize {
        CHANNEL_MAX_CLAIMS
    }

    fn bits(&self) -> &[u8] {
        &self.claimed_bitmap
    }

    fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.claimed_bitmap
    }
}

/// An epoch displaced by a publish, with how many of its claims were redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedEpoch {
    pub epoch: u64,
    pub claimed: usize,
}

/// Per-channel ring of recent epoch roots.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ChannelRingState {
    pub version: u8,
    pub bump: u8,
    pub mint: Address,
    pub subject: Address,
    pub latest_epoch: u64,
    pub slots: [ChannelSlot; CHANNEL_RING_SLOTS],
}

impl AccountLayout for ChannelRingState {
    const NAME: &'static str = "ChannelState";
}

impl ChannelRingState {
    /// Account size including the discriminator.
    pub const LEN: usize = 8 + 1 + 1 + 32 + 32 + 8 + ChannelSlot::LEN * CHANNEL_RING_SLOTS;

    #[must_use]
    pub fn new(mint: Address, subject: Address, bump: u8) -> Self {
        Self {
            version: CHANNEL_STATE_VERSION,
            bump,
            mint,
            subject,
            latest_epoch: 0,
            slots: [ChannelSlot::EMPTY; CHANNEL_RING_SLOTS],
        }
    }

    /// Ring position of `epoch`.
    #[must_use]
    pub fn slot_index(epoch: u64) -> usize {
        // the remainder is < CHANNEL_RING_SLOTS
        (epoch % CHANNEL_RING_SLOTS as u64) as usize
    }

    #[must_use]
    pub fn slot_for(&self, epoch: u64) -> &ChannelSlot {
        &self.slots[Self::slot_index(epoch)]
    }

    /// Write `(epoch, root)` into its slot and clear the slot's bitmap,
    /// whatever the slot held before.
    ///
    /// Returns the displaced epoch when the slot was occupied.
    ///
    /// # Errors
    /// [`LedgerError::InvalidEpoch`] for epoch 0, the empty-slot sentinel.
    pub fn publish(&mut self, epoch: u64, root: Hash) -> Result<Option<EvictedEpoch>, LedgerError> {
        if epoch == 0 {
            return Err(LedgerError::InvalidEpoch);
        }

        let slot = &mut self.slots[Self::slot_index(epoch)];
        let evicted = (!slot.is_empty()).then(|| EvictedEpoch {
            epoch: slot.epoch,
            claimed: slot.claimed_count(),
        });
        slot.reset(epoch, root);
        self.latest_epoch = self.latest_epoch.max(epoch);
        Ok(evicted)
    }

    /// The slot holding `epoch`, for claiming.
    ///
    /// # Errors
    /// [`LedgerError::SlotEpochMismatch`] when a later epoch has replaced the
    /// requested one; [`LedgerError::EpochNotFound`] when it has not been
    /// published yet.
    pub fn claim_slot_mut(&mut self, epoch: u64) -> Result<&mut ChannelSlot, LedgerError> {
        let latest = self.latest_epoch;
        let slot = &mut self.slots[Self::slot_index(epoch)];

        if epoch != 0 && slot.epoch == epoch {
            return Ok(slot);
        }
        if epoch != 0 && slot.epoch > epoch && epoch <= latest {
            return Err(LedgerError::SlotEpochMismatch {
                requested: epoch,
                resident: slot.epoch,
            });
        }
        Err(LedgerError::EpochNotFound(epoch))
    }

    /// Epochs currently resident, oldest first.
    #[must_use]
    pub fn resident_epochs(&self) -> Vec<u64> {
        let mut epochs: Vec<u64> = self
            .slots
            .iter()
            .filter(|slot| !slot.is_empty())
            .map(|slot| slot.epoch)
            .collect();
        epochs.sort_unstable();
        epochs
    }

    /// Root published for `epoch`, if it is still resident.
    #[must_use]
    pub fn root_for(&self, epoch: u64) -> Option<Hash> {
        let slot = self.slot_for(epoch);
        (epoch != 0 && slot.epoch == epoch).then_some(slot.root)
    }
}
