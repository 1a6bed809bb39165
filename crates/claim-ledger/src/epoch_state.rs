//! Epoch State Accounts
//!
//! One account per `(epoch, subject)` (legacy) or `(epoch, subject, mint)`
//! (open). Both variants share a discriminator and differ only in whether the
//! mint is stored:
//!
//! ```text
//! discriminator(8) | epoch(8) | root(32) | claim_count(4) | [mint(32)] |
//! subject(32) | treasury(32) | timestamp(8) | bump(1) | total_claimed(8) |
//! closed(1) | bitmap_len(4) | bitmap
//! ```
//!
//! The variant is not recorded in the data, so decoding needs to be told which
//! one the account was found under.

use crate::account::{strip_discriminator, DISCRIMINATOR_LEN};
use crate::address::{account_discriminator, legacy_epoch_state_address, open_epoch_state_address};
use crate::constants::MAX_EPOCH_CLAIMS;
use crate::error::LedgerError;
use crate::verifier::ClaimBitmap;
use borsh::BorshDeserialize;
use merkle_gen::{Address, Hash};

pub const EPOCH_STATE_NAME: &str = "EpochState";

/// Which address derivation (and layout) an epoch-state account uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EpochVariant {
    /// Predates the mint migration: no mint in seeds or data
    Legacy,
    /// Mint included in seeds and data
    Open { mint: Address },
}

impl EpochVariant {
    #[must_use]
    pub fn address(&self, program_id: &Address, epoch: u64, subject: &Address) -> Address {
        match self {
            Self::Legacy => legacy_epoch_state_address(program_id, epoch, subject),
            Self::Open { mint } => open_epoch_state_address(program_id, epoch, subject, mint),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Open { .. } => "open",
        }
    }
}

/// Root and claim bitmap for one epoch of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochState {
    pub variant: EpochVariant,
    pub epoch: u64,
    pub root: Hash,
    /// Leaves in the tree; also the bitmap capacity
    pub claim_count: u32,
    pub subject: Address,
    pub treasury: Address,
    /// Creation time (unix seconds)
    pub timestamp: i64,
    pub bump: u8,
    pub total_claimed: u64,
    pub closed: bool,
    pub claimed_bitmap: Vec<u8>,
}

impl EpochState {
    /// # Errors
    /// [`LedgerError::InvalidEpoch`] for epoch 0 and
    /// [`LedgerError::InvalidIndex`] when `claim_count` exceeds the bitmap limit.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        variant: EpochVariant,
        epoch: u64,
        root: Hash,
        claim_count: u32,
        subject: Address,
        treasury: Address,
        timestamp: i64,
        bump: u8,
    ) -> Result<Self, LedgerError> {
        if epoch == 0 {
            return Err(LedgerError::InvalidEpoch);
        }
        if claim_count as usize > MAX_EPOCH_CLAIMS {
            return Err(LedgerError::InvalidIndex {
                index: claim_count,
                capacity: MAX_EPOCH_CLAIMS,
            });
        }
        Ok(Self {
            variant,
            epoch,
            root,
            claim_count,
            subject,
            treasury,
            timestamp,
            bump,
            total_claimed: 0,
            closed: false,
            claimed_bitmap: vec![0u8; (claim_count as usize).div_ceil(8)],
        })
    }

    #[must_use]
    pub fn discriminator() -> [u8; 8] {
        account_discriminator(EPOCH_STATE_NAME)
    }

    /// Account size for a variant and leaf count.
    #[must_use]
    pub fn space_for(variant: &EpochVariant, claim_count: u32) -> usize {
        let mint = match variant {
            EpochVariant::Legacy => 0,
            EpochVariant::Open { .. } => 32,
        };
        DISCRIMINATOR_LEN + 8 + 32 + 4 + mint + 32 + 32 + 8 + 1 + 8 + 1 + 4
            + (claim_count as usize).div_ceil(8)
    }

    #[must_use]
    pub fn to_account_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::space_for(&self.variant, self.claim_count));
        data.extend_from_slice(&Self::discriminator());
        data.extend_from_slice(&self.epoch.to_le_bytes());
        data.extend_from_slice(&self.root);
        data.extend_from_slice(&self.claim_count.to_le_bytes());
        if let EpochVariant::Open { mint } = &self.variant {
            data.extend_from_slice(mint.as_ref());
        }
        data.extend_from_slice(self.subject.as_ref());
        data.extend_from_slice(self.treasury.as_ref());
        data.extend_from_slice(&self.timestamp.to_le_bytes());
        data.push(self.bump);
        data.extend_from_slice(&self.total_claimed.to_le_bytes());
        data.push(u8::from(self.closed));
        // bitmap length is bounded by MAX_EPOCH_CLAIMS / 8
        data.extend_from_slice(&(self.claimed_bitmap.len() as u32).to_le_bytes());
        data.extend_from_slice(&self.claimed_bitmap);
        data
    }

    /// Decode an account found at the `expected` variant's address.
    ///
    /// # Errors
    /// [`LedgerError::AccountVariantMismatch`] when the data does not parse as
    /// that variant, or an open account stores a different mint.
    pub fn from_account_data(
        address: &Address,
        data: &[u8],
        expected: &EpochVariant,
    ) -> Result<Self, LedgerError> {
        let mismatch = |_| LedgerError::AccountVariantMismatch(*address);
        let mut body = strip_discriminator(data, &Self::discriminator())?;
        let reader = &mut body;

        let epoch = u64::deserialize(reader).map_err(mismatch)?;
        let root = <[u8; 32]>::deserialize(reader).map_err(mismatch)?;
        let claim_count = u32::deserialize(reader).map_err(mismatch)?;
        let variant = match expected {
            EpochVariant::Legacy => EpochVariant::Legacy,
            EpochVariant::Open { .. } => EpochVariant::Open {
                mint: Address::deserialize(reader).map_err(mismatch)?,
            },
        };
        let subject = Address::deserialize(reader).map_err(mismatch)?;
        let treasury = Address::deserialize(reader).map_err(mismatch)?;
        let timestamp = i64::deserialize(reader).map_err(mismatch)?;
        let bump = u8::deserialize(reader).map_err(mismatch)?;
        let total_claimed = u64::deserialize(reader).map_err(mismatch)?;
        let closed = bool::deserialize(reader).map_err(mismatch)?;
        let claimed_bitmap = Vec::<u8>::deserialize(reader).map_err(mismatch)?;

        if !reader.is_empty()
            || variant != *expected
            || claimed_bitmap.len() != (claim_count as usize).div_ceil(8)
        {
            return Err(LedgerError::AccountVariantMismatch(*address));
        }

        Ok(Self {
            variant,
            epoch,
            root,
            claim_count,
            subject,
            treasury,
            timestamp,
            bump,
            total_claimed,
            closed,
            claimed_bitmap,
        })
    }

    /// # Errors
    /// [`LedgerError::EpochClosed`] once the account is closed.
    pub fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.closed {
            Err(LedgerError::EpochClosed)
        } else {
            Ok(())
        }
    }

    /// Earliest time a force-close is allowed.
    #[must_use]
    pub fn closable_at(&self, grace_period_secs: i64) -> i64 {
        self.timestamp.saturating_add(grace_period_secs)
    }

    /// # Errors
    /// [`LedgerError::GracePeriodNotElapsed`] until `grace_period_secs` have
    /// passed since creation.
    pub fn ensure_closable(&self, now: i64, grace_period_secs: i64) -> Result<(), LedgerError> {
        let closable_at = self.closable_at(grace_period_secs);
        if now < closable_at {
            return Err(LedgerError::GracePeriodNotElapsed {
                remaining_secs: closable_at - now,
            });
        }
        Ok(())
    }

    /// Record a settled claim.
    ///
    /// # Errors
    /// [`LedgerError::MathOverflow`] if the running total overflows.
    pub fn record_claim(&mut self, amount: u64) -> Result<(), LedgerError> {
        self.total_claimed = self
            .total_claimed
            .checked_add(amount)
            .ok_or(LedgerError::MathOverflow)?;
        Ok(())
    }
}

impl ClaimBitmap for EpochState {
    fn capacity(&self) -> usize {
        self.claim_count as usize
    }

    fn bits(&self) -> &[u8] {
        &self.claimed_bitmap
    }

    fn bits_mut(&mut self) -> &mut [u8] {
        &mut self.claimed_bitmap
    }
}
