//! Participation Datastore HTTP Client
//!
//! Fetches closed-epoch allocation records for a channel. The datastore is
//! read-only from our side; amounts arrive as decimal strings so large values
//! survive JSON number handling on the producer side.

use crate::types::{Address, AllocationRecord};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from datastore operations
#[derive(Debug, Error)]
pub enum DatasetClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Epoch {epoch} not found for channel {channel}")]
    EpochNotFound { channel: String, epoch: u64 },

    #[error("No closed epoch for channel {0}")]
    NoClosedEpoch(String),
}

/// Client for the participation datastore API
#[derive(Debug, Clone)]
pub struct DatasetClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct AllocationJson {
    claimer: Address,
    index: u32,
    amount: String,
    id: String,
}

#[derive(Deserialize)]
struct LatestEpochJson {
    epoch: String,
}

impl DatasetClient {
    /// Create a new datastore client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the datastore (e.g., `http://localhost:8080`)
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the allocation records of one closed epoch, ordered by index.
    ///
    /// # Errors
    /// Returns error if the request fails, the epoch is unknown, or a record
    /// is malformed.
    #[instrument(skip(self))]
    pub async fn get_allocations(
        &self,
        channel: &str,
        epoch: u64,
    ) -> Result<Vec<AllocationRecord>, DatasetClientError> {
        let url = format!(
            "{}/v1/channels/{channel}/epochs/{epoch}/allocations",
            self.base_url
        );

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DatasetClientError::EpochNotFound {
                channel: channel.to_string(),
                epoch,
            });
        }

        if !response.status().is_success() {
            return Err(DatasetClientError::InvalidResponse(format!(
                "Unexpected status: {}",
                response.status()
            )));
        }

        let body: Envelope<Vec<AllocationJson>> = response.json().await?;
        let mut records = body
            .data
            .into_iter()
            .map(|entry| {
                let amount = entry.amount.parse().map_err(|e| {
                    DatasetClientError::InvalidResponse(format!(
                        "Invalid amount for index {}: {e}",
                        entry.index
                    ))
                })?;
                Ok(AllocationRecord::new(entry.claimer, entry.index, amount, entry.id))
            })
            .collect::<Result<Vec<_>, DatasetClientError>>()?;

        records.sort_by_key(|record| record.index);
        debug!(count = records.len(), "Fetched allocations");
        Ok(records)
    }

    /// Fetch the most recent epoch the datastore has closed for `channel`.
    ///
    /// # Errors
    /// Returns error if the request fails or no epoch has closed yet.
    #[instrument(skip(self))]
    pub async fn get_latest_closed_epoch(&self, channel: &str) -> Result<u64, DatasetClientError> {
        let url = format!("{}/v1/channels/{channel}/epochs/latest", self.base_url);

        let response = self.client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DatasetClientError::NoClosedEpoch(channel.to_string()));
        }

        if !response.status().is_success() {
            return Err(DatasetClientError::InvalidResponse(format!(
                "Unexpected status: {}",
                response.status()
            )));
        }

        let body: Envelope<LatestEpochJson> = response.json().await?;
        body.data
            .epoch
            .parse()
            .map_err(|e| DatasetClientError::InvalidResponse(format!("Invalid epoch: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hex_addr(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    #[tokio::test]
    async fn test_get_allocations_sorted_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/lofi/epochs/7/allocations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"claimer": hex_addr(2), "index": 1, "amount": "250", "id": "b"},
                    {"claimer": hex_addr(1), "index": 0, "amount": "100", "id": "a"},
                ]
            })))
            .mount(&server)
            .await;

        let client = DatasetClient::new(server.uri());
        let records = client.get_allocations("lofi", 7).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], AllocationRecord::new(Address([1; 32]), 0, 100, "a"));
        assert_eq!(records[1].amount, 250);
    }

    #[tokio::test]
    async fn test_get_allocations_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/lofi/epochs/99/allocations"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = DatasetClient::new(server.uri());
        let err = client.get_allocations("lofi", 99).await.unwrap_err();
        assert!(matches!(
            err,
            DatasetClientError::EpochNotFound { epoch: 99, .. }
        ));
    }

    #[tokio::test]
    async fn test_get_allocations_bad_amount() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/lofi/epochs/1/allocations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"claimer": hex_addr(1), "index": 0, "amount": "-5", "id": "a"}]
            })))
            .mount(&server)
            .await;

        let client = DatasetClient::new(server.uri());
        assert!(matches!(
            client.get_allocations("lofi", 1).await,
            Err(DatasetClientError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_get_latest_closed_epoch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/channels/lofi/epochs/latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"epoch": "42"}})),
            )
            .mount(&server)
            .await;

        let client = DatasetClient::new(format!("{}/", server.uri()));
        assert_eq!(client.get_latest_closed_epoch("lofi").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_server_error_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = DatasetClient::new(server.uri());
        assert!(matches!(
            client.get_latest_closed_epoch("lofi").await,
            Err(DatasetClientError::InvalidResponse(_))
        ));
    }
}
