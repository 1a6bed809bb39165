//! Instruction Codec
//!
//! Wire format: `opcode(8) || args`, where the opcode is the first 8 bytes of
//! `sha256("global:" || name)` and args are Borsh fields in declaration order
//! (u64 LE, raw 32-byte keys, `u32 len || utf8` strings, `u32 count || nodes`
//! proofs). Decoding rejects unknown opcodes and any short or trailing args.

use crate::address::instruction_opcode;
use crate::error::LedgerError;
use crate::verifier::ClaimRequest;
use borsh::{BorshDeserialize, BorshSerialize};
use merkle_gen::{Address, Hash};

/// Operation kinds, one per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstructionKind {
    InitializeProtocol,
    UpdatePublisher,
    SetPaused,
    UpdateAdmin,
    InitializeChannel,
    SetChannelMerkleRoot,
    ClaimChannel,
    SetMerkleRoot,
    SetMerkleRootOpen,
    Claim,
    InitializeChannelCumulative,
    PublishCumulativeRoot,
    ClaimCumulative,
    ForceCloseEpochState,
}

impl InstructionKind {
    pub const ALL: [Self; 14] = [
        Self::InitializeProtocol,
        Self::UpdatePublisher,
        Self::SetPaused,
        Self::UpdateAdmin,
        Self::InitializeChannel,
        Self::SetChannelMerkleRoot,
        Self::ClaimChannel,
        Self::SetMerkleRoot,
        Self::SetMerkleRootOpen,
        Self::Claim,
        Self::InitializeChannelCumulative,
        Self::PublishCumulativeRoot,
        Self::ClaimCumulative,
        Self::ForceCloseEpochState,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InitializeProtocol => "initialize_protocol",
            Self::UpdatePublisher => "update_publisher",
            Self::SetPaused => "set_paused",
            Self::UpdateAdmin => "update_admin",
            Self::InitializeChannel => "initialize_channel",
            Self::SetChannelMerkleRoot => "set_channel_merkle_root",
            Self::ClaimChannel => "claim_channel_open",
            Self::SetMerkleRoot => "set_merkle_root",
            Self::SetMerkleRootOpen => "set_merkle_root_open",
            Self::Claim => "claim",
            Self::InitializeChannelCumulative => "initialize_channel_cumulative",
            Self::PublishCumulativeRoot => "publish_cumulative_root",
            Self::ClaimCumulative => "claim_cumulative",
            Self::ForceCloseEpochState => "force_close_epoch_state",
        }
    }

    #[must_use]
    pub fn opcode(self) -> [u8; 8] {
        instruction_opcode(self.name())
    }

    /// # Errors
    /// [`LedgerError::UnknownInstruction`] when no kind carries `opcode`.
    pub fn from_opcode(opcode: &[u8; 8]) -> Result<Self, LedgerError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.opcode() == *opcode)
            .ok_or(LedgerError::UnknownInstruction(*opcode))
    }
}

/// Every operation the ledger accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    InitializeProtocol {
        treasury: Address,
        publisher: Address,
    },
    UpdatePublisher {
        publisher: Address,
    },
    SetPaused {
        paused: bool,
    },
    UpdateAdmin {
        admin: Address,
    },
    InitializeChannel {
        subject: Address,
    },
    /// Ring publish
    SetChannelMerkleRoot {
        subject: Address,
        epoch: u64,
        root: Hash,
    },
    /// Ring claim
    ClaimChannel {
        subject: Address,
        claim: ClaimRequest,
    },
    /// Legacy epoch-state publish
    SetMerkleRoot {
        subject: Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    },
    /// Open epoch-state publish
    SetMerkleRootOpen {
        subject: Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    },
    /// Epoch-state claim against whichever variant exists
    Claim {
        subject: Address,
        claim: ClaimRequest,
    },
    InitializeChannelCumulative {
        subject: Address,
    },
    PublishCumulativeRoot {
        subject: Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    },
    ClaimCumulative {
        subject: Address,
        claim: ClaimRequest,
    },
    ForceCloseEpochState {
        subject: Address,
        epoch: u64,
    },
}

fn decode_args<T: BorshDeserialize>(args: &[u8]) -> Result<T, LedgerError> {
    borsh::from_slice(args).map_err(|e| LedgerError::InvalidInstructionData(e.to_string()))
}

impl Instruction {
    #[must_use]
    pub fn kind(&self) -> InstructionKind {
        match self {
            Self::InitializeProtocol { .. } => InstructionKind::InitializeProtocol,
            Self::UpdatePublisher { .. } => InstructionKind::UpdatePublisher,
            Self::SetPaused { .. } => InstructionKind::SetPaused,
            Self::UpdateAdmin { .. } => InstructionKind::UpdateAdmin,
            Self::InitializeChannel { .. } => InstructionKind::InitializeChannel,
            Self::SetChannelMerkleRoot { .. } => InstructionKind::SetChannelMerkleRoot,
            Self::ClaimChannel { .. } => InstructionKind::ClaimChannel,
            Self::SetMerkleRoot { .. } => InstructionKind::SetMerkleRoot,
            Self::SetMerkleRootOpen { .. } => InstructionKind::SetMerkleRootOpen,
            Self::Claim { .. } => InstructionKind::Claim,
            Self::InitializeChannelCumulative { .. } => {
                InstructionKind::InitializeChannelCumulative
            }
            Self::PublishCumulativeRoot { .. } => InstructionKind::PublishCumulativeRoot,
            Self::ClaimCumulative { .. } => InstructionKind::ClaimCumulative,
            Self::ForceCloseEpochState { .. } => InstructionKind::ForceCloseEpochState,
        }
    }

    /// Encode as `opcode || args`.
    ///
    /// # Errors
    /// Returns an error if a string or proof is too long to length-prefix.
    pub fn pack(&self) -> Result<Vec<u8>, LedgerError> {
        let mut out = self.kind().opcode().to_vec();
        let w = &mut out;
        match self {
            Self::InitializeProtocol {
                treasury,
                publisher,
            } => {
                treasury.serialize(w)?;
                publisher.serialize(w)?;
            }
            Self::UpdatePublisher { publisher } => publisher.serialize(w)?,
            Self::SetPaused { paused } => paused.serialize(w)?,
            Self::UpdateAdmin { admin } => admin.serialize(w)?,
            Self::InitializeChannel { subject } | Self::InitializeChannelCumulative { subject } => {
                subject.serialize(w)?;
            }
            Self::SetChannelMerkleRoot {
                subject,
                epoch,
                root,
            } => {
                subject.serialize(w)?;
                epoch.serialize(w)?;
                root.serialize(w)?;
            }
            Self::SetMerkleRoot {
                subject,
                epoch,
                root,
                claim_count,
            }
            | Self::SetMerkleRootOpen {
                subject,
                epoch,
                root,
                claim_count,
            }
            | Self::PublishCumulativeRoot {
                subject,
                epoch,
                root,
                claim_count,
            } => {
                subject.serialize(w)?;
                epoch.serialize(w)?;
                root.serialize(w)?;
                claim_count.serialize(w)?;
            }
            Self::ClaimChannel { subject, claim }
            | Self::Claim { subject, claim }
            | Self::ClaimCumulative { subject, claim } => {
                subject.serialize(w)?;
                claim.serialize(w)?;
            }
            Self::ForceCloseEpochState { subject, epoch } => {
                subject.serialize(w)?;
                epoch.serialize(w)?;
            }
        }
        Ok(out)
    }

    /// Decode `opcode || args`.
    ///
    /// # Errors
    /// [`LedgerError::UnknownInstruction`] for an unrecognized opcode,
    /// [`LedgerError::InvalidInstructionData`] for malformed args.
    pub fn unpack(data: &[u8]) -> Result<Self, LedgerError> {
        let (opcode, args) = data.split_first_chunk::<8>().ok_or_else(|| {
            LedgerError::InvalidInstructionData(format!("{} bytes, no opcode", data.len()))
        })?;

        let instruction = match InstructionKind::from_opcode(opcode)? {
            InstructionKind::InitializeProtocol => {
                let (treasury, publisher) = decode_args(args)?;
                Self::InitializeProtocol {
                    treasury,
                    publisher,
                }
            }
            InstructionKind::UpdatePublisher => Self::UpdatePublisher {
                publisher: decode_args(args)?,
            },
            InstructionKind::SetPaused => Self::SetPaused {
                paused: decode_args(args)?,
            },
            InstructionKind::UpdateAdmin => Self::UpdateAdmin {
                admin: decode_args(args)?,
            },
            InstructionKind::InitializeChannel => Self::InitializeChannel {
                subject: decode_args(args)?,
            },
            InstructionKind::SetChannelMerkleRoot => {
                let (subject, epoch, root) = decode_args(args)?;
                Self::SetChannelMerkleRoot {
                    subject,
                    epoch,
                    root,
                }
            }
            InstructionKind::ClaimChannel => {
                let (subject, claim) = decode_args(args)?;
                Self::ClaimChannel { subject, claim }
            }
            InstructionKind::SetMerkleRoot => {
                let (subject, epoch, root, claim_count) = decode_args(args)?;
                Self::SetMerkleRoot {
                    subject,
                    epoch,
                    root,
                    claim_count,
                }
            }
            InstructionKind::SetMerkleRootOpen => {
                let (subject, epoch, root, claim_count) = decode_args(args)?;
                Self::SetMerkleRootOpen {
                    subject,
                    epoch,
                    root,
                    claim_count,
                }
            }
            InstructionKind::Claim => {
                let (subject, claim) = decode_args(args)?;
                Self::Claim { subject, claim }
            }
            InstructionKind::InitializeChannelCumulative => Self::InitializeChannelCumulative {
                subject: decode_args(args)?,
            },
            InstructionKind::PublishCumulativeRoot => {
                let (subject, epoch, root, claim_count) = decode_args(args)?;
                Self::PublishCumulativeRoot {
                    subject,
                    epoch,
                    root,
                    claim_count,
                }
            }
            InstructionKind::ClaimCumulative => {
                let (subject, claim) = decode_args(args)?;
                Self::ClaimCumulative { subject, claim }
            }
            InstructionKind::ForceCloseEpochState => {
                let (subject, epoch) = decode_args(args)?;
                Self::ForceCloseEpochState { subject, epoch }
            }
        };
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECT: Address = Address([0x42; 32]);

    fn claim() -> ClaimRequest {
        ClaimRequest {
            epoch: 7,
            index: 3,
            amount: 1_000,
            id: "abc".to_string(),
            proof: vec![[0x11; 32], [0x22; 32]],
        }
    }

    #[test]
    fn test_opcodes_unique() {
        let mut opcodes: Vec<[u8; 8]> = InstructionKind::ALL.iter().map(|k| k.opcode()).collect();
        opcodes.sort_unstable();
        opcodes.dedup();
        assert_eq!(opcodes.len(), InstructionKind::ALL.len());
    }

    #[test]
    fn test_publish_wire_layout() {
        let data = Instruction::SetChannelMerkleRoot {
            subject: SUBJECT,
            epoch: 9,
            root: [0xee; 32],
        }
        .pack()
        .unwrap();

        assert_eq!(&data[..8], &instruction_opcode("set_channel_merkle_root"));
        assert_eq!(&data[8..40], &[0x42; 32]);
        assert_eq!(&data[40..48], &9u64.to_le_bytes());
        assert_eq!(&data[48..80], &[0xee; 32]);
        assert_eq!(data.len(), 80);
    }

    #[test]
    fn test_claim_wire_layout() {
        let data = Instruction::Claim {
            subject: SUBJECT,
            claim: claim(),
        }
        .pack()
        .unwrap();

        let args = &data[40..];
        assert_eq!(&args[..8], &7u64.to_le_bytes());
        assert_eq!(&args[8..12], &3u32.to_le_bytes());
        assert_eq!(&args[12..20], &1_000u64.to_le_bytes());
        assert_eq!(&args[20..24], &3u32.to_le_bytes());
        assert_eq!(&args[24..27], b"abc");
        assert_eq!(&args[27..31], &2u32.to_le_bytes());
        assert_eq!(args.len(), 31 + 64);

        assert_eq!(
            Instruction::unpack(&data).unwrap(),
            Instruction::Claim {
                subject: SUBJECT,
                claim: claim()
            }
        );
    }

    #[test]
    fn test_every_kind_decodes_to_itself() {
        let instructions = vec![
            Instruction::InitializeProtocol {
                treasury: Address([1; 32]),
                publisher: Address([2; 32]),
            },
            Instruction::SetPaused { paused: true },
            Instruction::ClaimCumulative {
                subject: SUBJECT,
                claim: claim(),
            },
            Instruction::PublishCumulativeRoot {
                subject: SUBJECT,
                epoch: 2,
                root: [3; 32],
                claim_count: 4,
            },
            Instruction::ForceCloseEpochState {
                subject: SUBJECT,
                epoch: 5,
            },
        ];
        for instruction in instructions {
            let data = instruction.pack().unwrap();
            let decoded = Instruction::unpack(&data).unwrap();
            assert_eq!(decoded.kind(), instruction.kind());
            assert_eq!(decoded, instruction);
        }
    }

    #[test]
    fn test_unknown_opcode() {
        let data = [0u8; 16];
        assert_eq!(
            Instruction::unpack(&data),
            Err(LedgerError::UnknownInstruction([0u8; 8]))
        );
    }

    #[test]
    fn test_malformed_args() {
        let mut data = Instruction::SetPaused { paused: false }.pack().unwrap();
        data.push(0);
        assert!(matches!(
            Instruction::unpack(&data),
            Err(LedgerError::InvalidInstructionData(_))
        ));

        let short = &Instruction::InitializeChannel { subject: SUBJECT }.pack().unwrap()[..20];
        assert!(matches!(
            Instruction::unpack(short),
            Err(LedgerError::InvalidInstructionData(_))
        ));

        assert!(matches!(
            Instruction::unpack(&[1, 2, 3]),
            Err(LedgerError::InvalidInstructionData(_))
        ));
    }
}
