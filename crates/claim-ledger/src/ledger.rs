//! Ledger State Machine
//!
//! Executes instructions one at a time against an account store. A handler
//! decodes the accounts it needs into local copies, runs every check, moves
//! tokens if the operation pays out, and only then writes the copies back.
//! An error anywhere before the write-back leaves the store unchanged.

use crate::account::AccountLayout;
use crate::address::{
    channel_state_address, cumulative_channel_address, protocol_address, CANONICAL_BUMP,
};
use crate::constants::{rent_exempt_minimum, EPOCH_FORCE_CLOSE_GRACE_SECS};
use crate::cumulative::CumulativeChannel;
use crate::epoch_state::{EpochState, EpochVariant};
use crate::error::LedgerError;
use crate::instruction::Instruction;
use crate::protocol::ProtocolState;
use crate::ring::ChannelRingState;
use crate::token::{InMemoryTokens, TokenTransfer, TransferReceipt};
use crate::verifier::{settle, verify_claim, ClaimRequest};
use merkle_gen::{Address, Hash};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

/// Ledger tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Owner of every derived account
    pub program_id: Address,
    /// Token mint claims are paid in
    pub mint: Address,
    /// Minimum epoch-state age before force-close
    pub grace_period_secs: i64,
}

impl LedgerConfig {
    #[must_use]
    pub fn new(program_id: Address, mint: Address) -> Self {
        Self {
            program_id,
            mint,
            grace_period_secs: EPOCH_FORCE_CLOSE_GRACE_SECS,
        }
    }

    #[must_use]
    pub fn with_grace_period(mut self, secs: i64) -> Self {
        self.grace_period_secs = secs;
        self
    }
}

/// Raw account: storage deposit plus encoded data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAccount {
    pub lamports: u64,
    pub data: Vec<u8>,
}

/// What a successful instruction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Published {
        address: Address,
        epoch: u64,
        root: Hash,
    },
    Claimed(TransferReceipt),
    Closed {
        address: Address,
        reclaimed: u64,
    },
}

/// In-process ledger: accounts, wallet lamports, a clock and a token backend.
#[derive(Debug)]
pub struct Ledger<T: TokenTransfer = InMemoryTokens> {
    config: LedgerConfig,
    accounts: BTreeMap<Address, StoredAccount>,
    lamports: HashMap<Address, u64>,
    clock: i64,
    tokens: T,
}

impl Ledger<InMemoryTokens> {
    #[must_use]
    pub fn with_memory_tokens(config: LedgerConfig) -> Self {
        Self::new(config, InMemoryTokens::new())
    }
}

impl<T: TokenTransfer> Ledger<T> {
    #[must_use]
    pub fn new(config: LedgerConfig, tokens: T) -> Self {
        Self {
            config,
            accounts: BTreeMap::new(),
            lamports: HashMap::new(),
            clock: 0,
            tokens,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &T {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut T {
        &mut self.tokens
    }

    /// Current unix time seen by handlers.
    #[must_use]
    pub fn clock(&self) -> i64 {
        self.clock
    }

    pub fn set_clock(&mut self, unix_secs: i64) {
        self.clock = unix_secs;
    }

    pub fn advance_clock(&mut self, secs: i64) {
        self.clock = self.clock.saturating_add(secs);
    }

    /// Credit a wallet with lamports for storage deposits.
    pub fn airdrop(&mut self, wallet: &Address, lamports: u64) {
        let balance = self.lamports.entry(*wallet).or_default();
        *balance = balance.saturating_add(lamports);
    }

    #[must_use]
    pub fn lamports(&self, wallet: &Address) -> u64 {
        self.lamports.get(wallet).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn account(&self, address: &Address) -> Option<&StoredAccount> {
        self.accounts.get(address)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &StoredAccount)> {
        self.accounts.iter()
    }

    #[must_use]
    pub fn protocol_address(&self) -> Address {
        protocol_address(&self.config.program_id, &self.config.mint)
    }

    #[must_use]
    pub fn channel_address(&self, subject: &Address) -> Address {
        channel_state_address(&self.config.program_id, &self.config.mint, subject)
    }

    #[must_use]
    pub fn cumulative_address(&self, subject: &Address) -> Address {
        cumulative_channel_address(&self.config.program_id, &self.config.mint, subject)
    }

    #[must_use]
    pub fn epoch_state_address(
        &self,
        variant: &EpochVariant,
        epoch: u64,
        subject: &Address,
    ) -> Address {
        variant.address(&self.config.program_id, epoch, subject)
    }

    fn open_variant(&self) -> EpochVariant {
        EpochVariant::Open {
            mint: self.config.mint,
        }
    }

    /// Decode an opcode-prefixed instruction and execute it.
    ///
    /// # Errors
    /// Decoding errors, then whatever the handler rejects.
    pub fn process(&mut self, caller: &Address, data: &[u8]) -> Result<Outcome, LedgerError> {
        let instruction = Instruction::unpack(data)?;
        self.execute(caller, instruction)
    }

    /// Execute one instruction on behalf of `caller`.
    ///
    /// # Errors
    /// Any [`LedgerError`]; the store is unchanged on error.
    #[instrument(skip(self, instruction), fields(kind = instruction.kind().name()))]
    pub fn execute(
        &mut self,
        caller: &Address,
        instruction: Instruction,
    ) -> Result<Outcome, LedgerError> {
        let result = match instruction {
            Instruction::InitializeProtocol {
                treasury,
                publisher,
            } => self.initialize_protocol(caller, treasury, publisher),
            Instruction::UpdatePublisher { publisher } => {
                self.update_protocol(|state| state.set_publisher(caller, publisher))
            }
            Instruction::SetPaused { paused } => {
                self.update_protocol(|state| state.set_paused(caller, paused))
            }
            Instruction::UpdateAdmin { admin } => {
                self.update_protocol(|state| state.set_admin(caller, admin))
            }
            Instruction::InitializeChannel { subject } => self.initialize_channel(caller, &subject),
            Instruction::SetChannelMerkleRoot {
                subject,
                epoch,
                root,
            } => self.set_channel_merkle_root(caller, &subject, epoch, root),
            Instruction::ClaimChannel { subject, claim } => {
                self.claim_channel(caller, &subject, &claim)
            }
            Instruction::SetMerkleRoot {
                subject,
                epoch,
                root,
                claim_count,
            } => {
                let variant = EpochVariant::Legacy;
                self.set_merkle_root(caller, variant, &subject, epoch, root, claim_count)
            }
            Instruction::SetMerkleRootOpen {
                subject,
                epoch,
                root,
                claim_count,
            } => {
                let variant = self.open_variant();
                self.set_merkle_root(caller, variant, &subject, epoch, root, claim_count)
            }
            Instruction::Claim { subject, claim } => self.claim_epoch(caller, &subject, &claim),
            Instruction::InitializeChannelCumulative { subject } => {
                self.initialize_cumulative(caller, &subject)
            }
            Instruction::PublishCumulativeRoot {
                subject,
                epoch,
                root,
                claim_count,
            } => self.publish_cumulative_root(caller, &subject, epoch, root, claim_count),
            Instruction::ClaimCumulative { subject, claim } => {
                self.claim_cumulative(caller, &subject, &claim)
            }
            Instruction::ForceCloseEpochState { subject, epoch } => {
                self.force_close_epoch_state(caller, &subject, epoch)
            }
        };

        if let Err(err) = &result {
            debug!(code = err.code(), %err, "Instruction rejected");
        }
        result
    }

    // ---- account store ----

    fn load<A: AccountLayout>(&self, address: &Address) -> Result<Option<A>, LedgerError> {
        self.accounts
            .get(address)
            .map(|account| A::from_account_data(&account.data))
            .transpose()
    }

    fn load_protocol(&self) -> Result<ProtocolState, LedgerError> {
        self.load(&self.protocol_address())?
            .ok_or(LedgerError::ProtocolNotInitialized)
    }

    /// Deposit the payer must cover for `data_len` bytes.
    ///
    /// # Errors
    /// [`LedgerError::InsufficientFunds`] if the payer cannot.
    fn check_deposit(&self, payer: &Address, data_len: usize) -> Result<u64, LedgerError> {
        let required = rent_exempt_minimum(data_len);
        let available = self.lamports(payer);
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                available,
                required,
            });
        }
        Ok(required)
    }

    /// Debit a checked deposit and store the new account.
    fn create_account(&mut self, payer: &Address, address: Address, data: Vec<u8>, deposit: u64) {
        if let Some(balance) = self.lamports.get_mut(payer) {
            *balance = balance.saturating_sub(deposit);
        }
        self.accounts.insert(
            address,
            StoredAccount {
                lamports: deposit,
                data,
            },
        );
    }

    /// Overwrite the data of an existing account.
    fn store(&mut self, address: &Address, data: Vec<u8>) -> Result<(), LedgerError> {
        let account = self
            .accounts
            .get_mut(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        account.data = data;
        Ok(())
    }

    // ---- protocol ----

    fn initialize_protocol(
        &mut self,
        caller: &Address,
        treasury: Address,
        publisher: Address,
    ) -> Result<Outcome, LedgerError> {
        let address = self.protocol_address();
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AlreadyInitialized);
        }
        if treasury.is_default() {
            return Err(LedgerError::InvalidPubkey);
        }

        let state =
            ProtocolState::new(*caller, publisher, treasury, self.config.mint, CANONICAL_BUMP);
        let data = state.to_account_data()?;
        let deposit = self.check_deposit(caller, data.len())?;
        self.create_account(caller, address, data, deposit);

        info!(admin = %caller, %publisher, %treasury, "Protocol initialized");
        Ok(Outcome::Done)
    }

    fn update_protocol(
        &mut self,
        apply: impl FnOnce(&mut ProtocolState) -> Result<(), LedgerError>,
    ) -> Result<Outcome, LedgerError> {
        let mut state = self.load_protocol()?;
        apply(&mut state)?;
        let data = state.to_account_data()?;
        self.store(&self.protocol_address(), data)?;

        info!(
            admin = %state.admin,
            publisher = %state.publisher,
            paused = state.paused,
            "Protocol updated"
        );
        Ok(Outcome::Done)
    }

    // ---- ring channels ----

    fn initialize_channel(
        &mut self,
        caller: &Address,
        subject: &Address,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_publisher(caller)?;

        let address = self.channel_address(subject);
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AlreadyInitialized);
        }

        let data =
            ChannelRingState::new(self.config.mint, *subject, CANONICAL_BUMP).to_account_data()?;
        let deposit = self.check_deposit(caller, data.len())?;
        self.create_account(caller, address, data, deposit);

        info!(%subject, %address, "Ring channel initialized");
        Ok(Outcome::Done)
    }

    fn set_channel_merkle_root(
        &mut self,
        caller: &Address,
        subject: &Address,
        epoch: u64,
        root: Hash,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_publisher(caller)?;
        protocol.ensure_active()?;

        let address = self.channel_address(subject);
        let mut ring: ChannelRingState = self
            .load(&address)?
            .ok_or(LedgerError::ChannelNotInitialized)?;

        if let Some(evicted) = ring.publish(epoch, root)? {
            warn!(
                %subject,
                evicted_epoch = evicted.epoch,
                claimed = evicted.claimed,
                epoch,
                "Ring slot overwritten; evicted epoch is no longer claimable"
            );
        }
        self.store(&address, ring.to_account_data()?)?;

        info!(%subject, epoch, root = %hex::encode(root), "Channel root published");
        Ok(Outcome::Published {
            address,
            epoch,
            root,
        })
    }

    fn claim_channel(
        &mut self,
        caller: &Address,
        subject: &Address,
        claim: &ClaimRequest,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.ensure_active()?;

        let address = self.channel_address(subject);
        let mut ring: ChannelRingState = self
            .load(&address)?
            .ok_or(LedgerError::ChannelNotInitialized)?;

        let slot = ring.claim_slot_mut(claim.epoch)?;
        let root = slot.root;
        verify_claim(caller, claim, &root, &*slot)?;
        let receipt = settle(&mut self.tokens, &protocol.treasury, caller, claim, slot)?;
        self.store(&address, ring.to_account_data()?)?;

        info!(
            %subject,
            epoch = claim.epoch,
            index = claim.index,
            amount = claim.amount,
            fee = receipt.fee,
            "Channel claim settled"
        );
        Ok(Outcome::Claimed(receipt))
    }

    // ---- epoch states ----

    fn set_merkle_root(
        &mut self,
        caller: &Address,
        variant: EpochVariant,
        subject: &Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_publisher(caller)?;
        protocol.ensure_active()?;

        let (address, data, deposit) = self.prepare_epoch_state(
            caller,
            &protocol,
            variant,
            subject,
            epoch,
            root,
            claim_count,
        )?;
        self.create_account(caller, address, data, deposit);

        info!(%subject, epoch, claim_count, variant = variant.name(), "Epoch root published");
        Ok(Outcome::Published {
            address,
            epoch,
            root,
        })
    }

    /// Validate and encode a fresh epoch-state account without storing it.
    #[allow(clippy::too_many_arguments)]
    fn prepare_epoch_state(
        &self,
        payer: &Address,
        protocol: &ProtocolState,
        variant: EpochVariant,
        subject: &Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    ) -> Result<(Address, Vec<u8>, u64), LedgerError> {
        let address = self.epoch_state_address(&variant, epoch, subject);
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::EpochAlreadyInitialized);
        }

        let state = EpochState::new(
            variant,
            epoch,
            root,
            claim_count,
            *subject,
            protocol.treasury,
            self.clock,
            CANONICAL_BUMP,
        )?;
        let data = state.to_account_data();
        let deposit = self.check_deposit(payer, data.len())?;
        Ok((address, data, deposit))
    }

    /// Find the epoch-state account for `(epoch, subject)`, trying the open
    /// derivation first and then the legacy one.
    ///
    /// # Errors
    /// [`LedgerError::EpochNotFound`] if neither exists;
    /// [`LedgerError::AccountVariantMismatch`] if the account found does not
    /// decode as the variant it was found under.
    pub fn locate_epoch_state(
        &self,
        epoch: u64,
        subject: &Address,
    ) -> Result<(Address, EpochState), LedgerError> {
        let open = self.open_variant();
        let open_address = self.epoch_state_address(&open, epoch, subject);
        let legacy_address = self.epoch_state_address(&EpochVariant::Legacy, epoch, subject);

        let (variant, address, account) = match (
            self.accounts.get(&open_address),
            self.accounts.get(&legacy_address),
        ) {
            (Some(account), legacy) => {
                if legacy.is_some() {
                    warn!(%subject, epoch, "Both epoch-state variants exist; using open");
                }
                (open, open_address, account)
            }
            (None, Some(account)) => (EpochVariant::Legacy, legacy_address, account),
            (None, None) => return Err(LedgerError::EpochNotFound(epoch)),
        };

        debug!(%subject, epoch, variant = variant.name(), %address, "Epoch state located");
        let state = EpochState::from_account_data(&address, &account.data, &variant)?;
        if state.epoch != epoch || state.subject != *subject {
            return Err(LedgerError::AccountVariantMismatch(address));
        }
        Ok((address, state))
    }

    fn claim_epoch(
        &mut self,
        caller: &Address,
        subject: &Address,
        claim: &ClaimRequest,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.ensure_active()?;

        let (address, mut state) = self.locate_epoch_state(claim.epoch, subject)?;
        let root = state.root;
        self.settle_epoch_claim(caller, &protocol, claim, &root, address, &mut state)
    }

    /// Verify against `root`, pay, mark the bit and write `state` back.
    fn settle_epoch_claim(
        &mut self,
        caller: &Address,
        protocol: &ProtocolState,
        claim: &ClaimRequest,
        root: &Hash,
        address: Address,
        state: &mut EpochState,
    ) -> Result<Outcome, LedgerError> {
        state.ensure_open()?;
        verify_claim(caller, claim, root, &*state)?;
        // `state` is a local copy; nothing reaches the store if settle fails
        state.record_claim(claim.amount)?;

        let receipt = settle(&mut self.tokens, &protocol.treasury, caller, claim, state)?;
        self.store(&address, state.to_account_data())?;

        info!(
            subject = %state.subject,
            epoch = claim.epoch,
            index = claim.index,
            amount = claim.amount,
            total_claimed = state.total_claimed,
            "Epoch claim settled"
        );
        Ok(Outcome::Claimed(receipt))
    }

    fn force_close_epoch_state(
        &mut self,
        caller: &Address,
        subject: &Address,
        epoch: u64,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_admin(caller)?;

        let (address, state) = self.locate_epoch_state(epoch, subject)?;
        state.ensure_closable(self.clock, self.config.grace_period_secs)?;

        let reclaimed = self
            .accounts
            .remove(&address)
            .map_or(0, |account| account.lamports);
        self.airdrop(caller, reclaimed);

        info!(
            %subject,
            epoch,
            reclaimed,
            claimed = state.total_claimed,
            "Epoch state force-closed"
        );
        Ok(Outcome::Closed { address, reclaimed })
    }

    // ---- cumulative channels ----

    fn initialize_cumulative(
        &mut self,
        caller: &Address,
        subject: &Address,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_publisher(caller)?;

        let address = self.cumulative_address(subject);
        if self.accounts.contains_key(&address) {
            return Err(LedgerError::AlreadyInitialized);
        }

        let data =
            CumulativeChannel::new(self.config.mint, *subject, CANONICAL_BUMP).to_account_data()?;
        let deposit = self.check_deposit(caller, data.len())?;
        self.create_account(caller, address, data, deposit);

        info!(%subject, %address, "Cumulative channel initialized");
        Ok(Outcome::Done)
    }

    fn publish_cumulative_root(
        &mut self,
        caller: &Address,
        subject: &Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.authorize_publisher(caller)?;
        protocol.ensure_can_publish(caller)?;

        let address = self.cumulative_address(subject);
        let mut channel: CumulativeChannel = self
            .load(&address)?
            .ok_or(LedgerError::ChannelNotInitialized)?;
        let root_seq = channel.publish(epoch, root)?;

        let variant = self.open_variant();
        let (epoch_address, epoch_data, deposit) = self.prepare_epoch_state(
            caller,
            &protocol,
            variant,
            subject,
            epoch,
            root,
            claim_count,
        )?;

        self.store(&address, channel.to_account_data()?)?;
        self.create_account(caller, epoch_address, epoch_data, deposit);

        info!(%subject, epoch, root_seq, claim_count, "Cumulative root published");
        Ok(Outcome::Published {
            address,
            epoch,
            root,
        })
    }

    fn claim_cumulative(
        &mut self,
        caller: &Address,
        subject: &Address,
        claim: &ClaimRequest,
    ) -> Result<Outcome, LedgerError> {
        let protocol = self.load_protocol()?;
        protocol.ensure_active()?;

        let channel: CumulativeChannel = self
            .load(&self.cumulative_address(subject))?
            .ok_or(LedgerError::ChannelNotInitialized)?;
        let root = channel.claimable_root(claim.epoch)?;

        let variant = self.open_variant();
        let address = self.epoch_state_address(&variant, claim.epoch, subject);
        let account = self
            .accounts
            .get(&address)
            .ok_or(LedgerError::EpochNotFound(claim.epoch))?;
        let mut state = EpochState::from_account_data(&address, &account.data, &variant)?;

        self.settle_epoch_claim(caller, &protocol, claim, &root, address, &mut state)
    }

    // ---- read helpers ----

    /// Decoded protocol state, if initialized.
    ///
    /// # Errors
    /// Returns an error if the stored data is corrupt.
    pub fn protocol(&self) -> Result<Option<ProtocolState>, LedgerError> {
        self.load(&self.protocol_address())
    }

    /// # Errors
    /// Returns an error if the stored data is corrupt.
    pub fn channel(&self, subject: &Address) -> Result<Option<ChannelRingState>, LedgerError> {
        self.load(&self.channel_address(subject))
    }

    /// # Errors
    /// Returns an error if the stored data is corrupt.
    pub fn cumulative_channel(
        &self,
        subject: &Address,
    ) -> Result<Option<CumulativeChannel>, LedgerError> {
        self.load(&self.cumulative_address(subject))
    }
}
