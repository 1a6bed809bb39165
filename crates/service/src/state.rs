//! Shared Application State
//!
//! Built trees and per-epoch publication status, keyed by `(channel, epoch)`.

use dashmap::DashMap;
use merkle_gen::{Address, ClaimProof, EpochTree, ProofError};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

pub type EpochKey = (String, u64);

/// Lifecycle of one epoch in this service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochStatus {
    /// Tree built, root not yet on the ledger
    Built,
    /// Publish instruction accepted
    Published,
    /// On-ledger root equals the local root
    Verified,
    /// On-ledger root differs, or publishing failed for good
    Failed,
}

/// Summary of a tracked epoch
#[derive(Debug, Clone, Serialize)]
pub struct EpochRecord {
    pub channel: String,
    pub epoch: u64,
    pub root: String,
    pub leaf_count: usize,
    /// Decimal string; can exceed u64
    pub total_amount: String,
    pub status: EpochStatus,
    pub signature: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("Epoch {1} of channel {0} is not tracked")]
    UnknownEpoch(String, u64),

    #[error("Epoch is {0:?}; proofs are served once the root is verified")]
    NotVerified(EpochStatus),

    #[error(transparent)]
    Proof(#[from] ProofError),
}

/// Shared application state
#[derive(Debug, Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

#[derive(Debug)]
struct AppStateInner {
    trees: DashMap<EpochKey, Arc<EpochTree>>,
    epochs: DashMap<EpochKey, EpochRecord>,
    /// Highest epoch built per channel
    latest: DashMap<String, u64>,
    /// Serializes publishes per channel
    publish_locks: DashMap<String, Arc<Mutex<()>>>,
    start_time: std::time::Instant,
    last_error: RwLock<Option<String>>,
}

impl AppState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                trees: DashMap::new(),
                epochs: DashMap::new(),
                latest: DashMap::new(),
                publish_locks: DashMap::new(),
                start_time: std::time::Instant::now(),
                last_error: RwLock::new(None),
            }),
        }
    }

    /// Cache a freshly built tree and track its epoch as `Built`.
    pub fn insert_tree(&self, channel: &str, epoch: u64, tree: EpochTree) -> Arc<EpochTree> {
        let tree = Arc::new(tree);
        let key = (channel.to_string(), epoch);
        self.inner.epochs.insert(
            key.clone(),
            EpochRecord {
                channel: channel.to_string(),
                epoch,
                root: format!("0x{}", hex::encode(tree.root())),
                leaf_count: tree.len(),
                total_amount: tree.total_amount().to_string(),
                status: EpochStatus::Built,
                signature: None,
                error: None,
            },
        );
        self.inner.trees.insert(key, Arc::clone(&tree));

        let mut latest = self.inner.latest.entry(channel.to_string()).or_insert(epoch);
        *latest = (*latest).max(epoch);
        tree
    }

    #[must_use]
    pub fn tree(&self, channel: &str, epoch: u64) -> Option<Arc<EpochTree>> {
        self.inner
            .trees
            .get(&(channel.to_string(), epoch))
            .map(|tree| Arc::clone(&tree))
    }

    /// Highest epoch built for `channel`.
    #[must_use]
    pub fn latest_epoch(&self, channel: &str) -> Option<u64> {
        self.inner.latest.get(channel).map(|epoch| *epoch)
    }

    pub fn set_status(&self, channel: &str, epoch: u64, status: EpochStatus) {
        if let Some(mut record) = self.inner.epochs.get_mut(&(channel.to_string(), epoch)) {
            record.status = status;
            if status == EpochStatus::Verified {
                record.error = None;
            }
        }
    }

    pub fn set_signature(&self, channel: &str, epoch: u64, signature: String) {
        if let Some(mut record) = self.inner.epochs.get_mut(&(channel.to_string(), epoch)) {
            record.signature = Some(signature);
        }
    }

    /// Mark an epoch `Failed` with a reason.
    pub fn fail(&self, channel: &str, epoch: u64, error: String) {
        if let Some(mut record) = self.inner.epochs.get_mut(&(channel.to_string(), epoch)) {
            record.status = EpochStatus::Failed;
            record.error = Some(error);
        }
    }

    #[must_use]
    pub fn get_epoch(&self, channel: &str, epoch: u64) -> Option<EpochRecord> {
        self.inner
            .epochs
            .get(&(channel.to_string(), epoch))
            .map(|r| r.clone())
    }

    /// All tracked epochs, by channel then epoch.
    #[must_use]
    pub fn all_epochs(&self) -> Vec<EpochRecord> {
        let mut records: Vec<EpochRecord> = self
            .inner
            .epochs
            .iter()
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| (&a.channel, a.epoch).cmp(&(&b.channel, b.epoch)));
        records
    }

    /// Proof for `claimer`, served only from verified epochs.
    ///
    /// # Errors
    /// Unknown epoch, unverified epoch, or claimer absent from the tree.
    pub fn proof(
        &self,
        channel: &str,
        epoch: u64,
        claimer: &Address,
    ) -> Result<ClaimProof, LookupError> {
        let record = self
            .get_epoch(channel, epoch)
            .ok_or_else(|| LookupError::UnknownEpoch(channel.to_string(), epoch))?;
        if record.status != EpochStatus::Verified {
            return Err(LookupError::NotVerified(record.status));
        }
        let tree = self
            .tree(channel, epoch)
            .ok_or_else(|| LookupError::UnknownEpoch(channel.to_string(), epoch))?;
        Ok(tree.proof_for_claimer(claimer)?)
    }

    /// Drop every cached epoch of `channel` matching `retired`.
    ///
    /// Returns the pruned epochs, ascending.
    pub fn prune(&self, channel: &str, retired: impl Fn(u64) -> bool) -> Vec<u64> {
        let mut pruned: Vec<u64> = self
            .inner
            .epochs
            .iter()
            .filter(|entry| entry.key().0 == channel && retired(entry.key().1))
            .map(|entry| entry.key().1)
            .collect();
        pruned.sort_unstable();

        for epoch in &pruned {
            let key = (channel.to_string(), *epoch);
            self.inner.epochs.remove(&key);
            self.inner.trees.remove(&key);
        }
        pruned
    }

    /// Lock held while publishing for `channel`.
    #[must_use]
    pub fn publish_lock(&self, channel: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.inner
                .publish_locks
                .entry(channel.to_string())
                .or_default()
                .value(),
        )
    }

    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for entry in self.inner.epochs.iter() {
            match entry.status {
                EpochStatus::Built => counts.built += 1,
                EpochStatus::Published => counts.published += 1,
                EpochStatus::Verified => counts.verified += 1,
                EpochStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Healthy while no epoch has a root mismatch.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status_counts().failed == 0
    }

    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn set_error(&self, error: Option<String>) {
        *self.inner.last_error.write() = error;
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts of epochs by status
#[derive(Debug, Default, Clone, Serialize)]
pub struct StatusCounts {
    pub built: usize,
    pub published: usize,
    pub verified: usize,
    pub failed: usize,
}
