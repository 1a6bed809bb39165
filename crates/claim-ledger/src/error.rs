//! Ledger Errors
//!
//! Every rejection happens before state is written or funds move. Codes are
//! stable (6000 + variant position) so off-chain callers can match on them.

use merkle_gen::Address;
use thiserror::Error;

/// Errors returned by ledger instructions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Already initialized")]
    AlreadyInitialized,

    #[error("Protocol is paused")]
    ProtocolPaused,

    #[error("Invalid pubkey (cannot be default)")]
    InvalidPubkey,

    #[error("Protocol not initialized")]
    ProtocolNotInitialized,

    #[error("Already claimed")]
    AlreadyClaimed,

    #[error("Invalid merkle proof")]
    InvalidProof,

    #[error("Invalid proof length: {0} nodes")]
    InvalidProofLength(usize),

    #[error("Channel not initialized")]
    ChannelNotInitialized,

    #[error("Epoch {0} not found")]
    EpochNotFound(u64),

    #[error("Slot holds epoch {resident}, not requested epoch {requested}")]
    SlotEpochMismatch { requested: u64, resident: u64 },

    #[error("Invalid epoch")]
    InvalidEpoch,

    #[error("Epoch {epoch} must be greater than {resident} for this slot")]
    EpochNotIncreasing { epoch: u64, resident: u64 },

    #[error("Epoch already initialized")]
    EpochAlreadyInitialized,

    #[error("Epoch closed")]
    EpochClosed,

    #[error("Grace period not elapsed ({remaining_secs}s remaining)")]
    GracePeriodNotElapsed { remaining_secs: i64 },

    #[error("Account at {0} does not match the expected epoch-state variant")]
    AccountVariantMismatch(Address),

    #[error("Invalid index {index} (capacity {capacity})")]
    InvalidIndex { index: u32, capacity: usize },

    #[error("Invalid input length: {0} bytes")]
    InvalidInputLength(usize),

    #[error("Insufficient treasury balance: {available} < {required}")]
    InsufficientTreasury { available: u64, required: u64 },

    #[error("Insufficient funds for storage deposit: {available} < {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("Fee basis points too high (max 1000 = 10%)")]
    FeeTooHigh,

    #[error("Math overflow")]
    MathOverflow,

    #[error("Unknown instruction opcode {}", hex::encode(.0))]
    UnknownInstruction([u8; 8]),

    #[error("Invalid instruction data: {0}")]
    InvalidInstructionData(String),

    #[error("Account {0} not found")]
    AccountNotFound(Address),

    #[error("Invalid account data: {0}")]
    InvalidAccountData(String),
}

impl LedgerError {
    /// Stable numeric error code.
    #[must_use]
    pub fn code(&self) -> u32 {
        let offset = match self {
            Self::Unauthorized => 0,
            Self::AlreadyInitialized => 1,
            Self::ProtocolPaused => 2,
            Self::InvalidPubkey => 3,
            Self::ProtocolNotInitialized => 4,
            Self::AlreadyClaimed => 5,
            Self::InvalidProof => 6,
            Self::InvalidProofLength(_) => 7,
            Self::ChannelNotInitialized => 8,
            Self::EpochNotFound(_) => 9,
            Self::SlotEpochMismatch { .. } => 10,
            Self::InvalidEpoch => 11,
            Self::EpochNotIncreasing { .. } => 12,
            Self::EpochAlreadyInitialized => 13,
            Self::EpochClosed => 14,
            Self::GracePeriodNotElapsed { .. } => 15,
            Self::AccountVariantMismatch(_) => 16,
            Self::InvalidIndex { .. } => 17,
            Self::InvalidInputLength(_) => 18,
            Self::InsufficientTreasury { .. } => 19,
            Self::InsufficientFunds { .. } => 20,
            Self::FeeTooHigh => 21,
            Self::MathOverflow => 22,
            Self::UnknownInstruction(_) => 23,
            Self::InvalidInstructionData(_) => 24,
            Self::AccountNotFound(_) => 25,
            Self::InvalidAccountData(_) => 26,
        };
        6000 + offset
    }

    /// The claim already went through; nothing to retry.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyClaimed)
    }

    /// The root may not be published yet or the protocol is paused; try again later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EpochNotFound(_) | Self::ProtocolPaused)
    }
}

impl From<borsh::io::Error> for LedgerError {
    fn from(err: borsh::io::Error) -> Self {
        Self::InvalidAccountData(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(LedgerError::Unauthorized.code(), 6000);
        assert_eq!(LedgerError::AlreadyClaimed.code(), 6005);
        assert_eq!(LedgerError::InvalidProof.code(), 6006);
        assert_eq!(
            LedgerError::InvalidAccountData(String::new()).code(),
            6026
        );
    }

    #[test]
    fn test_classification() {
        assert!(LedgerError::AlreadyClaimed.is_benign());
        assert!(!LedgerError::AlreadyClaimed.is_retryable());

        assert!(LedgerError::EpochNotFound(3).is_retryable());
        assert!(LedgerError::ProtocolPaused.is_retryable());

        let fatal = LedgerError::InvalidProof;
        assert!(!fatal.is_benign() && !fatal.is_retryable());
    }

    #[test]
    fn test_unknown_instruction_message() {
        let err = LedgerError::UnknownInstruction([0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 1]);
        assert_eq!(err.to_string(), "Unknown instruction opcode deadbeef00000001");
    }
}
