//! End-to-end harness: datastore records → tree → published root → claims.

use claim_ledger::{
    ClaimRequest, InMemoryTokens, Instruction, Ledger, LedgerConfig, LedgerError, Outcome,
    PublishMode, TransferFee,
};
use merkle_gen::{derive_subject_id, Address, AllocationRecord, EpochTree, TreeBuilder};

pub const ADMIN: Address = Address([0xad; 32]);
pub const PUBLISHER: Address = Address([0xbb; 32]);
pub const TREASURY: Address = Address([0x7e; 32]);
pub const PROGRAM_ID: Address = Address([0x01; 32]);
pub const MINT: Address = Address([0x02; 32]);

pub const TREASURY_FUNDS: u64 = 10_000_000;
pub const LAMPORTS: u64 = 100_000_000_000;
pub const GENESIS: i64 = 1_700_000_000;

/// A ledger with the protocol initialized and every actor funded.
pub struct Harness {
    pub ledger: Ledger,
    pub subject: Address,
}

impl Harness {
    #[must_use]
    pub fn new(channel: &str) -> Self {
        Self::with_fee(channel, TransferFee::zero())
    }

    /// # Panics
    /// If protocol initialization fails.
    #[must_use]
    pub fn with_fee(channel: &str, fee: TransferFee) -> Self {
        let mut tokens = InMemoryTokens::with_fee(fee);
        tokens.mint_to(&TREASURY, TREASURY_FUNDS);

        let mut ledger = Ledger::new(LedgerConfig::new(PROGRAM_ID, MINT), tokens);
        ledger.set_clock(GENESIS);
        ledger.airdrop(&ADMIN, LAMPORTS);
        ledger.airdrop(&PUBLISHER, LAMPORTS);
        ledger
            .execute(
                &ADMIN,
                Instruction::InitializeProtocol {
                    treasury: TREASURY,
                    publisher: PUBLISHER,
                },
            )
            .expect("initialize protocol");

        Self {
            ledger,
            subject: derive_subject_id(channel),
        }
    }

    /// Run an instruction through the byte-level entrypoint.
    ///
    /// # Errors
    /// Whatever the ledger rejects.
    ///
    /// # Panics
    /// If the instruction cannot be encoded.
    pub fn send(
        &mut self,
        caller: &Address,
        instruction: &Instruction,
    ) -> Result<Outcome, LedgerError> {
        let data = instruction.pack().expect("encode instruction");
        self.ledger.process(caller, &data)
    }

    /// Initialize the channel account if `mode` needs one.
    ///
    /// # Panics
    /// If initialization is rejected.
    pub fn prepare(&mut self, mode: PublishMode) {
        if let Some(init) = mode.initialize_instruction(self.subject) {
            self.send(&PUBLISHER, &init).expect("initialize channel");
        }
    }

    /// Build `records` into a tree and publish its root for `epoch`.
    ///
    /// # Errors
    /// Whatever the ledger rejects.
    ///
    /// # Panics
    /// If the records do not form a valid tree.
    pub fn publish(
        &mut self,
        mode: PublishMode,
        epoch: u64,
        records: Vec<AllocationRecord>,
    ) -> Result<EpochTree, LedgerError> {
        let builder = TreeBuilder::with_max_leaves(mode.max_leaves());
        let tree = EpochTree::build(&builder, records).expect("valid records");
        let claim_count = u32::try_from(tree.len()).expect("leaf count fits u32");
        let instruction = mode.publish_instruction(self.subject, epoch, tree.root(), claim_count);
        self.send(&PUBLISHER, &instruction)?;
        Ok(tree)
    }

    /// Claim `claimer`'s allocation of `epoch` in `mode`.
    ///
    /// # Errors
    /// Whatever the ledger rejects.
    ///
    /// # Panics
    /// If `claimer` is not in the tree.
    pub fn claim(
        &mut self,
        mode: PublishMode,
        tree: &EpochTree,
        epoch: u64,
        claimer: &Address,
    ) -> Result<Outcome, LedgerError> {
        let bundle = tree.proof_for_claimer(claimer).expect("claimer in tree");
        let mut claim = ClaimRequest::from(bundle);
        claim.epoch = epoch;
        let subject = self.subject;
        let instruction = match mode {
            PublishMode::Ring => Instruction::ClaimChannel { subject, claim },
            PublishMode::Legacy | PublishMode::Open => Instruction::Claim { subject, claim },
            PublishMode::Cumulative => Instruction::ClaimCumulative { subject, claim },
        };
        self.send(claimer, &instruction)
    }
}

/// Deterministic claimer for position `i`.
#[must_use]
pub fn claimer(i: u8) -> Address {
    let mut bytes = [0xc0; 32];
    bytes[31] = i;
    Address(bytes)
}

/// `count` records with amounts `(i + 1) * 100`.
#[must_use]
pub fn records(count: u8) -> Vec<AllocationRecord> {
    (0..count)
        .map(|i| {
            AllocationRecord::new(
                claimer(i),
                u32::from(i),
                (u64::from(i) + 1) * 100,
                format!("alloc-{i}"),
            )
        })
        .collect()
}
