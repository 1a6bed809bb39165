//! Allocation Types
//!
//! Shared value types for the builder and the on-chain verifier, plus the
//! capacity preset both sides must agree on.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Capacity constants shared by the builder and the ledger.
pub mod preset {
    /// Epoch slots retained per ring channel
    pub const CHANNEL_RING_SLOTS: usize = 10;
    /// Claimable leaf indices per ring slot
    pub const CHANNEL_MAX_CLAIMS: usize = 1024;
    /// Claim bitmap size per ring slot (1024 bits)
    pub const CHANNEL_BITMAP_BYTES: usize = CHANNEL_MAX_CLAIMS.div_ceil(8);
    /// Claimable leaf indices per epoch-state account
    pub const MAX_EPOCH_CLAIMS: usize = 1_000_000;
    /// Longest allocation id accepted by the verifier
    pub const MAX_ID_BYTES: usize = 64;
    /// Deepest proof accepted by the verifier (2^20 > `MAX_EPOCH_CLAIMS`)
    pub const MAX_PROOF_NODES: usize = 20;
}

/// A 32-byte Keccak digest (leaf, interior node or root).
pub type Hash = [u8; 32];

/// The all-zero root committed for an epoch with no allocations.
pub const EMPTY_ROOT: Hash = [0u8; 32];

/// 32-byte account address (claimer wallet, mint, subject id, ...).
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize,
)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero address, used as "unset".
    pub const DEFAULT: Self = Self([0u8; 32]);

    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn to_bytes(self) -> [u8; 32] {
        self.0
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        *self == Self::DEFAULT
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

/// Error parsing a hex-encoded 32-byte value
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseHashError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Parse a 32-byte value from hex, with or without a `0x` prefix.
///
/// # Errors
/// Returns an error if the input is not hex or does not decode to 32 bytes.
pub fn parse_hex32(s: &str) -> Result<Hash, ParseHashError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| ParseHashError::InvalidHex(e.to_string()))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| ParseHashError::InvalidLength(len))
}

impl FromStr for Address {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex32(s).map(Self)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        hex_bytes32::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        hex_bytes32::deserialize(deserializer).map(Self)
    }
}

/// One participant's allocation for one epoch.
///
/// `index` is the leaf position in the epoch tree and the bit consumed in the
/// on-chain claim bitmap; records are never mutated after the epoch closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    /// Wallet allowed to redeem this allocation
    pub claimer: Address,
    /// Leaf index, unique within the epoch
    pub index: u32,
    /// Token amount in base units
    pub amount: u64,
    /// Opaque allocation id (UTF-8, hashed verbatim)
    pub id: String,
}

impl AllocationRecord {
    #[must_use]
    pub fn new(claimer: Address, index: u32, amount: u64, id: impl Into<String>) -> Self {
        Self {
            claimer,
            index,
            amount,
            id: id.into(),
        }
    }

    /// Leaf hash committed for this record.
    #[must_use]
    pub fn leaf(&self) -> Hash {
        crate::leaf::compute_leaf(&self.claimer, self.index, self.amount, &self.id)
    }
}

/// Hex encoding helpers for a single 32-byte value
pub mod hex_bytes32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_hex32(&s).map_err(serde::de::Error::custom)
    }
}

/// Custom serde for `Vec<[u8; 32]>` as hex strings
pub mod proof_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(data: &Vec<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let hex_strings: Vec<String> = data
            .iter()
            .map(|h| format!("0x{}", hex::encode(h)))
            .collect();
        hex_strings.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_strings: Vec<String> = Vec::deserialize(deserializer)?;
        hex_strings
            .into_iter()
            .map(|s| super::parse_hex32(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_bitmap_covers_max_claims() {
        assert_eq!(preset::CHANNEL_BITMAP_BYTES, 128);
        assert_eq!(preset::CHANNEL_BITMAP_BYTES * 8, preset::CHANNEL_MAX_CLAIMS);
        assert!(1usize << preset::MAX_PROOF_NODES >= preset::MAX_EPOCH_CLAIMS);
    }

    #[test]
    fn test_address_display_and_parse() {
        let addr = Address([0xab; 32]);
        let s = addr.to_string();
        assert!(s.starts_with("0xabab"));
        assert_eq!(s.parse::<Address>().unwrap(), addr);

        let bare = s.strip_prefix("0x").unwrap();
        assert_eq!(bare.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_parse_hex32_invalid_length() {
        assert_eq!(parse_hex32("0x0102"), Err(ParseHashError::InvalidLength(2)));
        assert!(matches!(
            parse_hex32("0xzz"),
            Err(ParseHashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_allocation_record_json() {
        let record = AllocationRecord::new(Address([0x11; 32]), 3, 250, "b");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["claimer"], format!("0x{}", "11".repeat(32)));
        assert_eq!(json["index"], 3);

        let decoded: AllocationRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_address_borsh_is_raw_bytes() {
        let addr = Address([7u8; 32]);
        let encoded = borsh::to_vec(&addr).unwrap();
        assert_eq!(encoded, vec![7u8; 32]);
    }
}
