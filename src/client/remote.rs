//! Network-backed coordinator stub.
//!
//! Speaks JSON over HTTP to the real coordinator service. Only the startup
//! handshake originates on this side; everything else arrives as inbound
//! requests handled by [`crate::client::BackfillService`].

use crate::client::protocol::{ConfigureServiceRequest, ConfigureServiceResponse};
use crate::client::CoordinatorApi;
use crate::config::BackfillClientConfig;
use crate::error::{BackfillError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// HTTP client for the remote coordinator.
pub struct RemoteCoordinator {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteCoordinator {
    pub fn new(config: &BackfillClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| {
                BackfillError::configuration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            base_url: config.coordinator_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl CoordinatorApi for RemoteCoordinator {
    async fn configure_service(
        &self,
        request: ConfigureServiceRequest,
    ) -> Result<ConfigureServiceResponse> {
        let url = format!("{}/configure_service", self.base_url);
        debug!(url = %url, backfills = request.backfills.len(), "Configuring service with coordinator");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackfillError::registration(format!("request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            return Err(BackfillError::registration(format!(
                "coordinator returned {} from {url}",
                response.status()
            )));
        }

        response
            .json::<ConfigureServiceResponse>()
            .await
            .map_err(|e| BackfillError::registration(format!("invalid response body: {e}")))
    }
}
