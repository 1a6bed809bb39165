//! Seeds, limits and storage-deposit economics.

pub use merkle_gen::preset::*;

pub const PROTOCOL_SEED: &[u8] = b"protocol";
pub const CHANNEL_STATE_SEED: &[u8] = b"channel_state";
pub const CHANNEL_CUMULATIVE_SEED: &[u8] = b"channel_cumulative";
pub const EPOCH_STATE_SEED: &[u8] = b"epoch_state";

/// Layout version written into new ring channels.
pub const CHANNEL_STATE_VERSION: u8 = 1;
/// Layout version written into new cumulative channels.
pub const CUMULATIVE_CHANNEL_VERSION: u8 = 1;
pub const PROTOCOL_STATE_VERSION: u8 = 1;

/// Minimum age of an epoch-state account before an admin may force-close it.
pub const EPOCH_FORCE_CLOSE_GRACE_SECS: i64 = 7 * 24 * 60 * 60;

/// Transfer fee ceiling (10%).
pub const MAX_FEE_BASIS_POINTS: u16 = 1000;
pub const BASIS_POINTS_DENOMINATOR: u64 = 10_000;

/// Per-account metadata bytes charged on top of the data length.
pub const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;
pub const LAMPORTS_PER_BYTE_YEAR: u64 = 3480;
pub const EXEMPTION_THRESHOLD_YEARS: u64 = 2;

/// Deposit that keeps an account of `data_len` bytes alive indefinitely.
#[must_use]
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (data_len as u64 + ACCOUNT_STORAGE_OVERHEAD)
        * LAMPORTS_PER_BYTE_YEAR
        * EXEMPTION_THRESHOLD_YEARS
}
