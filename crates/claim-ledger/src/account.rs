//! Discriminator-prefixed account encoding.

use crate::address::account_discriminator;
use crate::error::LedgerError;
use borsh::{BorshDeserialize, BorshSerialize};

/// Length of the type tag at the start of every account.
pub const DISCRIMINATOR_LEN: usize = 8;

/// An account stored as `discriminator(8) || borsh(body)`.
pub trait AccountLayout: BorshSerialize + BorshDeserialize {
    /// Type name hashed into the discriminator.
    const NAME: &'static str;

    fn discriminator() -> [u8; 8] {
        account_discriminator(Self::NAME)
    }

    /// # Errors
    /// Returns an error if the body fails to serialize.
    fn to_account_data(&self) -> Result<Vec<u8>, LedgerError> {
        let mut data = Self::discriminator().to_vec();
        borsh::to_writer(&mut data, self)?;
        Ok(data)
    }

    /// # Errors
    /// Returns an error on a wrong discriminator, a short body or trailing bytes.
    fn from_account_data(data: &[u8]) -> Result<Self, LedgerError> {
        let body = strip_discriminator(data, &Self::discriminator())?;
        Ok(borsh::from_slice(body)?)
    }
}

/// Check the type tag and return the body after it.
///
/// # Errors
/// Returns [`LedgerError::InvalidAccountData`] when the tag is missing or differs.
pub fn strip_discriminator<'a>(
    data: &'a [u8],
    expected: &[u8; 8],
) -> Result<&'a [u8], LedgerError> {
    match data.split_first_chunk::<DISCRIMINATOR_LEN>() {
        Some((tag, body)) if tag == expected => Ok(body),
        Some(_) => Err(LedgerError::InvalidAccountData(
            "discriminator mismatch".to_string(),
        )),
        None => Err(LedgerError::InvalidAccountData(format!(
            "account too short: {} bytes",
            data.len()
        ))),
    }
}
