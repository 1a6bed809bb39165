//! Epoch Builder
//!
//! Polls the participation datastore for each configured channel, builds the
//! tree of every newly closed epoch and hands it to the submitter.

use crate::state::{AppState, EpochStatus};
use crate::submitter::Submitter;
use anyhow::{Context, Result};
use claim_ledger::PublishMode;
use merkle_gen::{DatasetClient, EpochTree, TreeBuilder};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// A channel the service maintains, written `name:mode` on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub name: String,
    pub mode: PublishMode,
}

impl FromStr for ChannelConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, mode) = match s.split_once(':') {
            Some((name, mode)) => (name, mode.parse()?),
            None => (s, PublishMode::Ring),
        };
        if name.is_empty() {
            return Err(format!("empty channel name in '{s}'"));
        }
        Ok(Self {
            name: name.to_string(),
            mode,
        })
    }
}

/// Builder configuration
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    pub dataset_url: String,
    pub poll_interval: Duration,
    pub channels: Vec<ChannelConfig>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            dataset_url: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(30),
            channels: Vec::new(),
        }
    }
}

/// Epoch builder
pub struct EpochBuilder {
    config: BuilderConfig,
    client: DatasetClient,
    submitter: Arc<Submitter>,
    state: AppState,
}

impl EpochBuilder {
    pub fn new(config: BuilderConfig, submitter: Arc<Submitter>, state: AppState) -> Self {
        let client = DatasetClient::new(config.dataset_url.clone());
        Self {
            config,
            client,
            submitter,
            state,
        }
    }

    /// Run the builder loop
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<()> {
        info!(channels = self.config.channels.len(), "Starting epoch builder");

        loop {
            let mut last_error = None;
            for channel in &self.config.channels {
                if let Err(e) = self.poll_channel(channel).await {
                    error!(channel = %channel.name, error = %e, "Builder poll failed");
                    last_error = Some(format!("{}: {e:#}", channel.name));
                }
            }
            self.state.set_error(last_error);

            sleep(self.config.poll_interval).await;
        }
    }

    /// Single poll iteration for one channel
    async fn poll_channel(&self, channel: &ChannelConfig) -> Result<()> {
        let epoch = self.client.get_latest_closed_epoch(&channel.name).await?;
        metrics::gauge!("ledger_latest_closed_epoch", "channel" => channel.name.clone())
            .set(epoch as f64);

        let tree = match self.state.tree(&channel.name, epoch) {
            Some(tree) => match self.state.get_epoch(&channel.name, epoch).map(|r| r.status) {
                // Final states need no more work
                Some(EpochStatus::Verified | EpochStatus::Failed) => return Ok(()),
                _ => tree,
            },
            None => {
                let tree = self.build_epoch(channel, epoch).await?;
                self.state.insert_tree(&channel.name, epoch, tree)
            }
        };

        let status = self
            .submitter
            .publish(&self.state, &channel.name, channel.mode, epoch, &tree)
            .await
            .with_context(|| format!("publishing epoch {epoch}"))?;
        match status {
            EpochStatus::Failed => warn!(channel = %channel.name, epoch, "Epoch marked failed"),
            EpochStatus::Verified => self.retire_superseded(channel, epoch),
            EpochStatus::Built | EpochStatus::Published => {}
        }
        Ok(())
    }

    /// Forget cached epochs the ledger no longer accepts claims for.
    fn retire_superseded(&self, channel: &ChannelConfig, epoch: u64) {
        let pruned = self
            .state
            .prune(&channel.name, |earlier| channel.mode.supersedes(epoch, earlier));
        if !pruned.is_empty() {
            metrics::counter!("ledger_epochs_pruned_total").increment(pruned.len() as u64);
            info!(channel = %channel.name, epoch, ?pruned, "Superseded epochs dropped from cache");
        }
    }

    async fn build_epoch(&self, channel: &ChannelConfig, epoch: u64) -> Result<EpochTree> {
        let records = self.client.get_allocations(&channel.name, epoch).await?;
        let builder = TreeBuilder::with_max_leaves(channel.mode.max_leaves());
        let tree = EpochTree::build(&builder, records)
            .with_context(|| format!("building epoch {epoch} of {}", channel.name))?;

        metrics::counter!("ledger_epochs_built_total").increment(1);
        info!(
            channel = %channel.name,
            epoch,
            leaves = tree.len(),
            root = %hex::encode(tree.root()),
            "Epoch tree built"
        );
        Ok(tree)
    }
}
