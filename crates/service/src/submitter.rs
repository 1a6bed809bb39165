//! Root Submitter
//!
//! Publishes an epoch root to the ledger and confirms it by reading it back.
//! Without a publisher identity the submitter is read-only: it only verifies
//! roots someone else already published.

use crate::state::{AppState, EpochStatus};
use anyhow::{Context, Result};
use claim_ledger::{LedgerError, LedgerRpcClient, PublishMode, RpcClientError};
use merkle_gen::{derive_subject_id, Address, EpochTree};
use tracing::{debug, info, instrument, warn};

/// Submitter configuration
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Ledger node JSON-RPC URL
    pub rpc_url: String,
    pub program_id: String,
    pub mint: String,
    /// Identity publish instructions are sent as
    pub publisher: Option<String>,
}

/// Root submitter
#[derive(Debug)]
pub struct Submitter {
    client: LedgerRpcClient,
    publisher: Option<Address>,
}

impl Submitter {
    /// # Errors
    /// Returns an error if an address does not parse.
    pub fn new(config: SubmitterConfig) -> Result<Self> {
        let program_id: Address = config.program_id.parse().context("Invalid program id")?;
        let mint: Address = config.mint.parse().context("Invalid mint")?;
        let publisher = config
            .publisher
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
            .context("Invalid publisher address")?;

        match &publisher {
            Some(address) => info!(%address, "Submitter initialized with publisher"),
            None => info!("Submitter initialized read-only"),
        }

        Ok(Self {
            client: LedgerRpcClient::new(config.rpc_url, program_id, mint),
            publisher,
        })
    }

    #[must_use]
    pub fn publisher(&self) -> Option<&Address> {
        self.publisher.as_ref()
    }

    #[must_use]
    pub fn client(&self) -> &LedgerRpcClient {
        &self.client
    }

    /// Bring `(channel, epoch)` to a final status and record it in `state`.
    ///
    /// Publishes are serialized per channel. An epoch whose on-ledger root is
    /// already the local root is verified without sending anything.
    ///
    /// # Errors
    /// Transport errors and non-benign ledger rejections; the epoch keeps its
    /// previous status so the next poll retries.
    #[instrument(skip(self, state, tree), fields(root = %hex::encode(tree.root())))]
    pub async fn publish(
        &self,
        state: &AppState,
        channel: &str,
        mode: PublishMode,
        epoch: u64,
        tree: &EpochTree,
    ) -> Result<EpochStatus> {
        let lock = state.publish_lock(channel);
        let _guard = lock.lock().await;

        let subject = derive_subject_id(channel);
        let existing = self.client.published_root(mode, &subject, epoch).await?;
        if let Some(published) = existing {
            debug!("Root already on the ledger");
            return Ok(settle(state, channel, epoch, tree, published));
        }

        let Some(publisher) = self.publisher else {
            debug!("Read-only; waiting for the root to appear");
            return Ok(EpochStatus::Built);
        };

        if let Some(init) = mode.initialize_instruction(subject) {
            if !self.channel_exists(mode, &subject).await? {
                self.send_tolerating(&publisher, &init, LedgerError::AlreadyInitialized)
                    .await?;
                info!(%subject, "Channel initialized");
            }
        }

        let instruction = mode.publish_instruction(subject, epoch, tree.root(), claim_count(tree)?);
        let signature = self.client.send_instruction(&publisher, &instruction).await?;
        state.set_signature(channel, epoch, signature);
        state.set_status(channel, epoch, EpochStatus::Published);
        metrics::counter!("ledger_roots_published_total").increment(1);

        let published = self
            .client
            .published_root(mode, &subject, epoch)
            .await?
            .context("Published root not readable after publish")?;
        Ok(settle(state, channel, epoch, tree, published))
    }

    async fn channel_exists(&self, mode: PublishMode, subject: &Address) -> Result<bool> {
        Ok(match mode {
            PublishMode::Ring => self.client.get_channel(subject).await?.is_some(),
            PublishMode::Cumulative => self.client.get_cumulative_channel(subject).await?.is_some(),
            PublishMode::Legacy | PublishMode::Open => true,
        })
    }

    async fn send_tolerating(
        &self,
        caller: &Address,
        instruction: &claim_ledger::Instruction,
        tolerated: LedgerError,
    ) -> Result<()> {
        match self.client.send_instruction(caller, instruction).await {
            Ok(_) => Ok(()),
            Err(RpcClientError::Rejected { code, .. })
                if u32::try_from(code).ok() == Some(tolerated.code()) =>
            {
                debug!(code, "Already done");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Compare the on-ledger root with the local tree and record the verdict.
fn settle(
    state: &AppState,
    channel: &str,
    epoch: u64,
    tree: &EpochTree,
    published: merkle_gen::Hash,
) -> EpochStatus {
    match tree.ensure_matches(&published) {
        Ok(()) => {
            state.set_status(channel, epoch, EpochStatus::Verified);
            info!(channel, epoch, "Root verified");
            EpochStatus::Verified
        }
        Err(e) => {
            warn!(channel, epoch, error = %e, "Root mismatch; withholding proofs");
            metrics::counter!("ledger_root_mismatch_total").increment(1);
            state.fail(channel, epoch, e.to_string());
            EpochStatus::Failed
        }
    }
}

fn claim_count(tree: &EpochTree) -> Result<u32> {
    u32::try_from(tree.len()).context("Epoch has too many leaves")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tests::sample_tree;
    use claim_ledger::{AccountLayout, ChannelRingState};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PROGRAM: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";
    const MINT: &str = "0x0202020202020202020202020202020202020202020202020202020202020202";

    fn config(rpc_url: String, publisher: Option<&str>) -> SubmitterConfig {
        SubmitterConfig {
            rpc_url,
            program_id: PROGRAM.to_string(),
            mint: MINT.to_string(),
            publisher: publisher.map(str::to_string),
        }
    }

    async fn ring_server(epoch: u64, root: [u8; 32]) -> MockServer {
        let mint: Address = MINT.parse().unwrap();
        let mut ring = ChannelRingState::new(mint, derive_subject_id("alpha"), 255);
        ring.publish(epoch, root).unwrap();

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": "getAccountInfo" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": { "lamports": 1, "data": hex::encode(ring.to_account_data().unwrap()) },
            })))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_submitter_creation_readonly() {
        let submitter = Submitter::new(config("http://localhost:8899".to_string(), None)).unwrap();
        assert!(submitter.publisher().is_none());
    }

    #[test]
    fn test_submitter_invalid_addresses() {
        let mut bad = config("http://localhost:8899".to_string(), Some("not_an_address"));
        assert!(Submitter::new(bad.clone()).is_err());
        bad.publisher = None;
        bad.mint = "0x1234".to_string();
        assert!(Submitter::new(bad).is_err());
    }

    #[tokio::test]
    async fn test_existing_matching_root_verifies() {
        let tree = sample_tree();
        let server = ring_server(4, tree.root()).await;
        let state = AppState::new();
        state.insert_tree("alpha", 4, sample_tree());

        let submitter = Submitter::new(config(server.uri(), None)).unwrap();
        let status = submitter
            .publish(&state, "alpha", PublishMode::Ring, 4, &tree)
            .await
            .unwrap();
        assert_eq!(status, EpochStatus::Verified);
        assert_eq!(state.get_epoch("alpha", 4).unwrap().status, EpochStatus::Verified);
    }

    #[tokio::test]
    async fn test_existing_foreign_root_fails() {
        let tree = sample_tree();
        let server = ring_server(4, [0xee; 32]).await;
        let state = AppState::new();
        state.insert_tree("alpha", 4, sample_tree());

        let submitter = Submitter::new(config(server.uri(), None)).unwrap();
        let status = submitter
            .publish(&state, "alpha", PublishMode::Ring, 4, &tree)
            .await
            .unwrap();
        assert_eq!(status, EpochStatus::Failed);
        assert!(state.get_epoch("alpha", 4).unwrap().error.is_some());
    }

    #[tokio::test]
    async fn test_readonly_waits_for_root() {
        let tree = sample_tree();
        // epoch 5 is not resident
        let server = ring_server(4, tree.root()).await;
        let state = AppState::new();
        state.insert_tree("alpha", 5, sample_tree());

        let submitter = Submitter::new(config(server.uri(), None)).unwrap();
        let status = submitter
            .publish(&state, "alpha", PublishMode::Ring, 5, &tree)
            .await
            .unwrap();
        assert_eq!(status, EpochStatus::Built);
    }
}
