//! Root publication modes.

use crate::epoch_state::EpochVariant;
use crate::instruction::Instruction;
use crate::ring::ChannelRingState;
use merkle_gen::{Address, Hash};
use std::fmt;
use std::str::FromStr;

/// Where a channel's epoch roots are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PublishMode {
    /// Ten-slot ring on the channel account
    Ring,
    /// One legacy epoch-state account per epoch
    Legacy,
    /// One mint-scoped epoch-state account per epoch
    Open,
    /// Single advancing root plus an open epoch-state bitmap
    Cumulative,
}

impl PublishMode {
    pub const ALL: [Self; 4] = [Self::Ring, Self::Legacy, Self::Open, Self::Cumulative];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ring => "ring",
            Self::Legacy => "legacy",
            Self::Open => "open",
            Self::Cumulative => "cumulative",
        }
    }

    /// Instruction that publishes `root` for `(subject, epoch)` in this mode.
    #[must_use]
    pub fn publish_instruction(
        self,
        subject: Address,
        epoch: u64,
        root: Hash,
        claim_count: u32,
    ) -> Instruction {
        match self {
            Self::Ring => Instruction::SetChannelMerkleRoot {
                subject,
                epoch,
                root,
            },
            Self::Legacy => Instruction::SetMerkleRoot {
                subject,
                epoch,
                root,
                claim_count,
            },
            Self::Open => Instruction::SetMerkleRootOpen {
                subject,
                epoch,
                root,
                claim_count,
            },
            Self::Cumulative => Instruction::PublishCumulativeRoot {
                subject,
                epoch,
                root,
                claim_count,
            },
        }
    }

    /// Instruction that prepares the channel account, if the mode has one.
    #[must_use]
    pub fn initialize_instruction(self, subject: Address) -> Option<Instruction> {
        match self {
            Self::Ring => Some(Instruction::InitializeChannel { subject }),
            Self::Cumulative => Some(Instruction::InitializeChannelCumulative { subject }),
            Self::Legacy | Self::Open => None,
        }
    }

    /// Epoch-state variant holding the claim bitmap, if any.
    #[must_use]
    pub fn epoch_variant(self, mint: Address) -> Option<EpochVariant> {
        match self {
            Self::Ring => None,
            Self::Legacy => Some(EpochVariant::Legacy),
            Self::Open | Self::Cumulative => Some(EpochVariant::Open { mint }),
        }
    }

    /// Largest tree a single epoch can publish in this mode.
    #[must_use]
    pub fn max_leaves(self) -> usize {
        match self {
            Self::Ring => crate::constants::CHANNEL_MAX_CLAIMS,
            Self::Legacy | Self::Open | Self::Cumulative => crate::constants::MAX_EPOCH_CLAIMS,
        }
    }

    /// Whether publishing `published` leaves `earlier` unclaimable.
    ///
    /// A ring publish displaces whatever shared its slot; a cumulative publish
    /// retires every earlier root. Epoch-state accounts live until closed.
    #[must_use]
    pub fn supersedes(self, published: u64, earlier: u64) -> bool {
        match self {
            Self::Ring => {
                let slot = ChannelRingState::slot_index;
                earlier != published && slot(earlier) == slot(published)
            }
            Self::Cumulative => earlier < published,
            Self::Legacy | Self::Open => false,
        }
    }
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown publish mode '{s}' (expected ring, legacy, open or cumulative)")
            })
    }
}
