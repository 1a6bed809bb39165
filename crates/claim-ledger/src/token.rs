//! Token-transfer seam.
//!
//! Claims are paid through [`TokenTransfer`] so the ledger state machine does
//! not care how balances are held. [`InMemoryTokens`] mirrors a mint with a
//! transfer-fee extension: the fee is withheld from what the recipient gets.

use crate::constants::{BASIS_POINTS_DENOMINATOR, MAX_FEE_BASIS_POINTS};
use crate::error::LedgerError;
use merkle_gen::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-transfer fee: `ceil(amount * bps / 10000)`, capped at `max_fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransferFee {
    basis_points: u16,
    max_fee: u64,
}

impl TransferFee {
    /// # Errors
    /// [`LedgerError::FeeTooHigh`] above `MAX_FEE_BASIS_POINTS`.
    pub fn new(basis_points: u16, max_fee: u64) -> Result<Self, LedgerError> {
        if basis_points > MAX_FEE_BASIS_POINTS {
            return Err(LedgerError::FeeTooHigh);
        }
        Ok(Self {
            basis_points,
            max_fee,
        })
    }

    #[must_use]
    pub const fn zero() -> Self {
        Self {
            basis_points: 0,
            max_fee: 0,
        }
    }

    #[must_use]
    pub fn basis_points(&self) -> u16 {
        self.basis_points
    }

    #[must_use]
    pub fn calculate(&self, amount: u64) -> u64 {
        if self.basis_points == 0 || amount == 0 {
            return 0;
        }
        let numerator = u128::from(amount) * u128::from(self.basis_points);
        let fee = numerator.div_ceil(u128::from(BASIS_POINTS_DENOMINATOR));
        u64::try_from(fee).unwrap_or(u64::MAX).min(self.max_fee)
    }
}

/// Outcome of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Debited from the sender
    pub gross: u64,
    /// Withheld by the mint
    pub fee: u64,
    /// Credited to the recipient
    pub net: u64,
}

/// Moves settled amounts between token holders.
pub trait TokenTransfer {
    fn balance(&self, owner: &Address) -> u64;

    /// Move `amount` from `from` to `to`.
    ///
    /// # Errors
    /// Fails without side effects if `from` cannot cover `amount`.
    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError>;
}

/// Balances held in memory, keyed by owner.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokens {
    balances: HashMap<Address, u64>,
    fee: TransferFee,
    withheld: u64,
}

impl InMemoryTokens {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fee(fee: TransferFee) -> Self {
        Self {
            fee,
            ..Self::default()
        }
    }

    pub fn mint_to(&mut self, owner: &Address, amount: u64) {
        let balance = self.balances.entry(*owner).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Fees withheld across all transfers.
    #[must_use]
    pub fn withheld(&self) -> u64 {
        self.withheld
    }

    #[must_use]
    pub fn fee(&self) -> TransferFee {
        self.fee
    }
}

impl TokenTransfer for InMemoryTokens {
    fn balance(&self, owner: &Address) -> u64 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<TransferReceipt, LedgerError> {
        let available = self.balance(from);
        if available < amount {
            return Err(LedgerError::InsufficientTreasury {
                available,
                required: amount,
            });
        }

        let fee = self.fee.calculate(amount);
        let net = amount - fee;
        let withheld = self.withheld.checked_add(fee).ok_or(LedgerError::MathOverflow)?;

        let debited = available - amount;
        let credit_base = if from == to { debited } else { self.balance(to) };
        let credited = credit_base.checked_add(net).ok_or(LedgerError::MathOverflow)?;

        self.balances.insert(*from, debited);
        self.balances.insert(*to, credited);
        self.withheld = withheld;

        Ok(TransferReceipt {
            gross: amount,
            fee,
            net,
        })
    }
}
