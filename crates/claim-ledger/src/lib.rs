//! # Claim Ledger
//!
//! Ledger side of the channel reward scheme. Publishers commit one Merkle
//! root per `(channel, epoch)`; claimers redeem their allocation by proving
//! membership, and a per-epoch bitmap makes every leaf redeemable once.
//!
//! Three publication modes share the same verifier:
//! - ring: the channel account keeps the last ten epoch roots
//! - epoch state: one account per epoch (legacy or mint-scoped open variant)
//! - cumulative: a single advancing root backed by an open epoch state
//!
//! [`Ledger`] executes the opcode-prefixed [`Instruction`] stream against an
//! in-process account store. [`LedgerRpcClient`] (feature `client`) talks to a
//! node running the same program.

pub mod account;
pub mod address;
pub mod constants;
pub mod cumulative;
pub mod epoch_state;
pub mod error;
pub mod instruction;
pub mod ledger;
pub mod protocol;
pub mod publisher;
pub mod ring;
pub mod token;
pub mod verifier;

#[cfg(feature = "client")]
pub mod client;

pub use account::AccountLayout;
#[cfg(feature = "client")]
pub use client::{AccountInfo, LedgerRpcClient, RpcClientError};
pub use cumulative::CumulativeChannel;
pub use epoch_state::{EpochState, EpochVariant};
pub use error::LedgerError;
pub use instruction::{Instruction, InstructionKind};
pub use ledger::{Ledger, LedgerConfig, Outcome, StoredAccount};
pub use protocol::ProtocolState;
pub use publisher::PublishMode;
pub use ring::{ChannelRingState, ChannelSlot, EvictedEpoch, SlotState};
pub use token::{InMemoryTokens, TokenTransfer, TransferFee, TransferReceipt};
pub use verifier::{settle, verify_claim, ClaimBitmap, ClaimRequest};
