//! Protocol singleton: roles, treasury and pause switch for one mint.

use crate::account::AccountLayout;
use crate::constants::PROTOCOL_STATE_VERSION;
use crate::error::LedgerError;
use borsh::{BorshDeserialize, BorshSerialize};
use merkle_gen::Address;

#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct ProtocolState {
    pub is_initialized: bool,
    pub version: u8,
    /// May reconfigure, pause and force-close
    pub admin: Address,
    /// May publish roots; default means "admin only"
    pub publisher: Address,
    /// Owner of the token balance claims are paid from
    pub treasury: Address,
    pub mint: Address,
    pub paused: bool,
    pub bump: u8,
}

impl AccountLayout for ProtocolState {
    const NAME: &'static str = "ProtocolState";
}

impl ProtocolState {
    #[must_use]
    pub fn new(
        admin: Address,
        publisher: Address,
        treasury: Address,
        mint: Address,
        bump: u8,
    ) -> Self {
        Self {
            is_initialized: true,
            version: PROTOCOL_STATE_VERSION,
            admin,
            publisher,
            treasury,
            mint,
            paused: false,
            bump,
        }
    }

    /// # Errors
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin.
    pub fn authorize_admin(&self, caller: &Address) -> Result<(), LedgerError> {
        if *caller == self.admin {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    /// The admin may always publish; the publisher only when one is set.
    ///
    /// # Errors
    /// [`LedgerError::Unauthorized`] for anyone else.
    pub fn authorize_publisher(&self, caller: &Address) -> Result<(), LedgerError> {
        let is_publisher = !self.publisher.is_default() && *caller == self.publisher;
        if *caller == self.admin || is_publisher {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    /// Claims stop entirely while paused.
    ///
    /// # Errors
    /// [`LedgerError::ProtocolPaused`] while paused.
    pub fn ensure_active(&self) -> Result<(), LedgerError> {
        if self.paused {
            Err(LedgerError::ProtocolPaused)
        } else {
            Ok(())
        }
    }

    /// Cumulative roots may still be published by the admin while paused.
    ///
    /// # Errors
    /// [`LedgerError::ProtocolPaused`] for a non-admin caller while paused.
    pub fn ensure_can_publish(&self, caller: &Address) -> Result<(), LedgerError> {
        if self.paused && *caller != self.admin {
            Err(LedgerError::ProtocolPaused)
        } else {
            Ok(())
        }
    }

    /// # Errors
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin.
    pub fn set_publisher(
        &mut self,
        caller: &Address,
        publisher: Address,
    ) -> Result<(), LedgerError> {
        self.authorize_admin(caller)?;
        self.publisher = publisher;
        Ok(())
    }

    /// # Errors
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin.
    pub fn set_paused(&mut self, caller: &Address, paused: bool) -> Result<(), LedgerError> {
        self.authorize_admin(caller)?;
        self.paused = paused;
        Ok(())
    }

    /// # Errors
    /// [`LedgerError::Unauthorized`] unless `caller` is the admin;
    /// [`LedgerError::InvalidPubkey`] for a default new admin.
    pub fn set_admin(&mut self, caller: &Address, admin: Address) -> Result<(), LedgerError> {
        self.authorize_admin(caller)?;
        if admin.is_default() {
            return Err(LedgerError::InvalidPubkey);
        }
        self.admin = admin;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIN: Address = Address([1; 32]);
    const PUBLISHER: Address = Address([2; 32]);
    const STRANGER: Address = Address([3; 32]);

    fn state() -> ProtocolState {
        ProtocolState::new(ADMIN, PUBLISHER, Address([4; 32]), Address([5; 32]), 255)
    }

    #[test]
    fn test_roles() {
        let state = state();
        assert!(state.authorize_admin(&ADMIN).is_ok());
        assert_eq!(state.authorize_admin(&PUBLISHER), Err(LedgerError::Unauthorized));

        assert!(state.authorize_publisher(&ADMIN).is_ok());
        assert!(state.authorize_publisher(&PUBLISHER).is_ok());
        assert_eq!(state.authorize_publisher(&STRANGER), Err(LedgerError::Unauthorized));
    }

    #[test]
    fn test_default_publisher_is_not_a_wildcard() {
        let mut state = state();
        state.set_publisher(&ADMIN, Address::DEFAULT).unwrap();
        assert_eq!(
            state.authorize_publisher(&Address::DEFAULT),
            Err(LedgerError::Unauthorized)
        );
        assert!(state.authorize_publisher(&ADMIN).is_ok());
    }

    #[test]
    fn test_pause_gates() {
        let mut state = state();
        assert_eq!(state.set_paused(&PUBLISHER, true), Err(LedgerError::Unauthorized));
        state.set_paused(&ADMIN, true).unwrap();

        assert_eq!(state.ensure_active(), Err(LedgerError::ProtocolPaused));
        assert_eq!(state.ensure_can_publish(&PUBLISHER), Err(LedgerError::ProtocolPaused));
        assert!(state.ensure_can_publish(&ADMIN).is_ok());
    }

    #[test]
    fn test_update_admin() {
        let mut state = state();
        assert_eq!(
            state.set_admin(&ADMIN, Address::DEFAULT),
            Err(LedgerError::InvalidPubkey)
        );
        state.set_admin(&ADMIN, STRANGER).unwrap();
        assert_eq!(state.authorize_admin(&ADMIN), Err(LedgerError::Unauthorized));
        assert!(state.authorize_admin(&STRANGER).is_ok());
    }

    #[test]
    fn test_account_layout_len() {
        let data = state().to_account_data().unwrap();
        assert_eq!(data.len(), 8 + 1 + 1 + 32 * 4 + 1 + 1);
        assert_eq!(ProtocolState::from_account_data(&data).unwrap(), state());
    }
}
