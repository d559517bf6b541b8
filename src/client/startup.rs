//! Startup handshake with the coordinator.
//!
//! Advertises the process's backfill catalog at startup. Registration is
//! best-effort: the engine's core duty is running batches, so a failed
//! handshake is logged and process startup continues.

use crate::client::protocol::{
    BackfillData, ConfigureServiceRequest, HttpConnectorData, CONNECTOR_TYPE_HTTP,
};
use crate::client::CoordinatorApi;
use crate::config::BackfillClientConfig;
use crate::error::{BackfillError, Result};
use crate::registry::Catalog;
use tracing::{info, warn};

pub struct StartupConfigurator {
    config: BackfillClientConfig,
    catalog: Catalog,
}

impl StartupConfigurator {
    pub fn new(config: BackfillClientConfig, catalog: Catalog) -> Self {
        Self { config, catalog }
    }

    /// Build the ConfigureService request from the catalog and config.
    pub fn build_request(&self) -> Result<ConfigureServiceRequest> {
        let connector_data = HttpConnectorData {
            url: self.config.service_url.clone(),
        };
        let connector_extra_data = serde_json::to_string(&connector_data).map_err(|e| {
            BackfillError::configuration(format!("Failed to encode connector data: {e}"))
        })?;

        Ok(ConfigureServiceRequest {
            backfills: self
                .catalog
                .names()
                .iter()
                .map(|name| BackfillData { name: name.clone() })
                .collect(),
            connector_type: CONNECTOR_TYPE_HTTP.to_string(),
            connector_extra_data: Some(connector_extra_data),
            slack_channel: self.config.slack_channel.clone(),
        })
    }

    /// Register the catalog with the coordinator. Failures are logged and
    /// swallowed; registration never aborts startup.
    pub async fn configure(&self, coordinator: &dyn CoordinatorApi) -> Result<()> {
        info!("Backfill configurator starting");
        let request = self.build_request()?;
        let backfills = request.backfills.len();

        match coordinator.configure_service(request).await {
            Ok(_) => {
                info!(
                    backfills,
                    "Coordinator updated with backfill catalog"
                );
            }
            Err(e) => {
                warn!(error = %e, "Startup call to configure coordinator failed, skipped");
            }
        }
        Ok(())
    }
}
