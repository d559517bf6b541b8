//! # Client Configuration
//!
//! Process-construction-time configuration for the backfill engine: where
//! the coordinator lives, how to reach this service back, and the optional
//! notification channel. Immutable after construction.

use crate::error::{BackfillError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillClientConfig {
    /// Base URL of the coordinator service.
    pub coordinator_url: String,
    /// URL of this service, so the coordinator can call back into it.
    pub service_url: String,
    /// Optional notification channel identifier (e.g. a Slack channel).
    pub slack_channel: Option<String>,
    /// Timeout for coordinator HTTP calls, in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for BackfillClientConfig {
    fn default() -> Self {
        Self {
            coordinator_url: "http://localhost:8080".to_string(),
            service_url: "http://localhost:8000".to_string(),
            slack_channel: None,
            request_timeout_ms: 5_000,
        }
    }
}

impl BackfillClientConfig {
    /// Build the config from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BACKFILL_COORDINATOR_URL") {
            config.coordinator_url = url;
        }

        if let Ok(url) = std::env::var("BACKFILL_SERVICE_URL") {
            config.service_url = url;
        }

        if let Ok(channel) = std::env::var("BACKFILL_SLACK_CHANNEL") {
            config.slack_channel = Some(channel);
        }

        if let Ok(timeout) = std::env::var("BACKFILL_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = timeout.parse().map_err(|e| {
                BackfillError::configuration(format!("Invalid request_timeout_ms: {e}"))
            })?;
        }

        Ok(config)
    }
}
