//! Ledger RPC Client
//!
//! JSON-RPC 2.0 over HTTP. Two methods are used:
//! - `getAccountInfo [address]` → `null` or `{"lamports": n, "data": "<hex>"}`
//! - `sendInstruction [{"caller": address, "data": "<hex>"}]` → `"<signature>"`
//!
//! A rejected instruction comes back as a JSON-RPC error whose code is the
//! ledger error code.

use crate::account::AccountLayout;
use crate::address::{channel_state_address, cumulative_channel_address, protocol_address};
use crate::cumulative::CumulativeChannel;
use crate::epoch_state::{EpochState, EpochVariant};
use crate::error::LedgerError;
use crate::instruction::Instruction;
use crate::protocol::ProtocolState;
use crate::publisher::PublishMode;
use crate::ring::ChannelRingState;
use merkle_gen::{Address, Hash};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum RpcClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Ledger rejected instruction ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl RpcClientError {
    /// Ledger error code of a rejection.
    #[must_use]
    pub fn ledger_code(&self) -> Option<u32> {
        match self {
            Self::Rejected { code, .. } => u32::try_from(*code).ok(),
            _ => None,
        }
    }

    /// The instruction already took effect (e.g. a repeated claim).
    #[must_use]
    pub fn is_benign(&self) -> bool {
        self.ledger_code() == Some(LedgerError::AlreadyClaimed.code())
    }

    /// Worth retrying later without changing the request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpError(_) => true,
            Self::Rejected { .. } => self.ledger_code().is_some_and(|code| {
                code == LedgerError::EpochNotFound(0).code()
                    || code == LedgerError::ProtocolPaused.code()
            }),
            _ => false,
        }
    }
}

/// Raw account as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub lamports: u64,
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct SendParams {
    caller: Address,
    #[serde(with = "hex::serde")]
    data: Vec<u8>,
}

/// Client for one ledger program and mint.
#[derive(Debug)]
pub struct LedgerRpcClient {
    client: Client,
    rpc_url: String,
    program_id: Address,
    mint: Address,
    next_id: AtomicU64,
}

impl LedgerRpcClient {
    #[must_use]
    pub fn new(rpc_url: impl Into<String>, program_id: Address, mint: Address) -> Self {
        Self {
            client: Client::new(),
            rpc_url: rpc_url.into(),
            program_id,
            mint,
            next_id: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    #[must_use]
    pub fn program_id(&self) -> &Address {
        &self.program_id
    }

    #[must_use]
    pub fn mint(&self) -> &Address {
        &self.mint
    }

    async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, RpcClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.rpc_url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(RpcClientError::InvalidResponse(format!(
                "Unexpected status: {}",
                response.status()
            )));
        }

        let response: RpcResponse<T> = response.json().await?;
        if let Some(error) = response.error {
            let is_ledger_code = u32::try_from(error.code).is_ok_and(|code| code >= 6000);
            return Err(if is_ledger_code {
                RpcClientError::Rejected {
                    code: error.code,
                    message: error.message,
                }
            } else {
                RpcClientError::Rpc {
                    code: error.code,
                    message: error.message,
                }
            });
        }
        Ok(response.result)
    }

    /// Fetch a raw account; `None` if it does not exist.
    ///
    /// # Errors
    /// Returns error on transport failure or a malformed response.
    #[instrument(skip(self))]
    pub async fn get_account(
        &self,
        address: &Address,
    ) -> Result<Option<AccountInfo>, RpcClientError> {
        let account: Option<AccountInfo> = self.call("getAccountInfo", json!([address])).await?;
        debug!(found = account.is_some(), "Fetched account");
        Ok(account)
    }

    async fn get_decoded<A: AccountLayout>(
        &self,
        address: &Address,
    ) -> Result<Option<A>, RpcClientError> {
        match self.get_account(address).await? {
            Some(account) => Ok(Some(A::from_account_data(&account.data)?)),
            None => Ok(None),
        }
    }

    /// Submit an instruction on behalf of `caller`. Returns the signature.
    ///
    /// # Errors
    /// [`RpcClientError::Rejected`] carries the ledger error code.
    #[instrument(skip(self, instruction), fields(kind = instruction.kind().name()))]
    pub async fn send_instruction(
        &self,
        caller: &Address,
        instruction: &Instruction,
    ) -> Result<String, RpcClientError> {
        let params = SendParams {
            caller: *caller,
            data: instruction.pack()?,
        };
        let signature: String = self
            .call("sendInstruction", json!([params]))
            .await?
            .ok_or_else(|| RpcClientError::InvalidResponse("Missing signature".to_string()))?;

        info!(%signature, "Instruction accepted");
        Ok(signature)
    }

    /// # Errors
    /// Returns error on transport or decode failure.
    pub async fn get_protocol(&self) -> Result<Option<ProtocolState>, RpcClientError> {
        self.get_decoded(&protocol_address(&self.program_id, &self.mint))
            .await
    }

    /// # Errors
    /// Returns error on transport or decode failure.
    pub async fn get_channel(
        &self,
        subject: &Address,
    ) -> Result<Option<ChannelRingState>, RpcClientError> {
        self.get_decoded(&channel_state_address(&self.program_id, &self.mint, subject))
            .await
    }

    /// # Errors
    /// Returns error on transport or decode failure.
    pub async fn get_cumulative_channel(
        &self,
        subject: &Address,
    ) -> Result<Option<CumulativeChannel>, RpcClientError> {
        self.get_decoded(&cumulative_channel_address(&self.program_id, &self.mint, subject))
            .await
    }

    /// # Errors
    /// Returns error on transport or decode failure.
    pub async fn get_epoch_state(
        &self,
        variant: &EpochVariant,
        epoch: u64,
        subject: &Address,
    ) -> Result<Option<EpochState>, RpcClientError> {
        let address = variant.address(&self.program_id, epoch, subject);
        match self.get_account(&address).await? {
            Some(account) => Ok(Some(EpochState::from_account_data(
                &address,
                &account.data,
                variant,
            )?)),
            None => Ok(None),
        }
    }

    /// Root currently published for `(subject, epoch)` under `mode`.
    ///
    /// `None` when nothing is published, or the epoch has been superseded.
    ///
    /// # Errors
    /// Returns error on transport or decode failure.
    #[instrument(skip(self))]
    pub async fn published_root(
        &self,
        mode: PublishMode,
        subject: &Address,
        epoch: u64,
    ) -> Result<Option<Hash>, RpcClientError> {
        let root = match mode {
            PublishMode::Ring => self
                .get_channel(subject)
                .await?
                .and_then(|ring| ring.root_for(epoch)),
            PublishMode::Cumulative => self
                .get_cumulative_channel(subject)
                .await?
                .and_then(|channel| channel.claimable_root(epoch).ok()),
            PublishMode::Legacy | PublishMode::Open => {
                let Some(variant) = mode.epoch_variant(self.mint) else {
                    return Ok(None);
                };
                self.get_epoch_state(&variant, epoch, subject)
                    .await?
                    .map(|state| state.root)
            }
        };
        debug!(found = root.is_some(), "Read published root");
        Ok(root)
    }
}
