//! # Embedded Coordinator
//!
//! A small in-process substitute for the remote coordinator, suitable for
//! tests and development mode. Unlike the full coordinator it keeps no
//! state beyond the process lifetime, accepts exactly one service
//! registration, and hands out run ids from a local counter.
//!
//! All of its mutable state (the registration slot and the run-id counter)
//! lives on an explicitly constructed instance, never in a global, so a
//! test process can host several independent coordinators.

use crate::client::protocol::{
    ConfigureServiceRequest, ConfigureServiceResponse, PrepareBackfillRequest, CONNECTOR_TYPE_HTTP,
};
use crate::client::{BackfillService, CoordinatorApi};
use crate::error::{BackfillError, Result};
use crate::operator::{RunConfig, RunHandle};
use crate::registry::Catalog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// First run id issued by an embedded coordinator. Seeded above any id a
/// real coordinator would plausibly issue early, to avoid collisions when
/// embedded and remote runs mix in hybrid test setups.
pub const FIRST_EMBEDDED_RUN_ID: u64 = 10;

struct ConfiguredService {
    request: ConfigureServiceRequest,
    configured_at: DateTime<Utc>,
}

/// In-process coordinator: same request surface as the remote one, backed
/// by nothing but memory.
pub struct EmbeddedCoordinator {
    service: BackfillService,
    configured: Mutex<Option<ConfiguredService>>,
    next_run_id: AtomicU64,
}

impl EmbeddedCoordinator {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            service: BackfillService::new(catalog),
            configured: Mutex::new(None),
            next_run_id: AtomicU64::new(FIRST_EMBEDDED_RUN_ID),
        }
    }

    /// The engine-side request surface driven by this coordinator.
    pub fn service(&self) -> &BackfillService {
        &self.service
    }

    /// When the service registration was accepted, if it has been.
    pub fn configured_at(&self) -> Option<DateTime<Utc>> {
        self.configured.lock().as_ref().map(|c| c.configured_at)
    }

    /// Create and prepare a dry run of `backfill_name`.
    pub async fn create_dry_run(
        &self,
        backfill_name: &str,
        parameters: HashMap<String, Vec<u8>>,
        range_start: Option<&str>,
        range_end: Option<&str>,
    ) -> Result<Arc<dyn RunHandle>> {
        self.create_run(backfill_name, true, parameters, range_start, range_end)
            .await
    }

    /// Create and prepare a wet (mutating) run of `backfill_name`.
    pub async fn create_wet_run(
        &self,
        backfill_name: &str,
        parameters: HashMap<String, Vec<u8>>,
        range_start: Option<&str>,
        range_end: Option<&str>,
    ) -> Result<Arc<dyn RunHandle>> {
        self.create_run(backfill_name, false, parameters, range_start, range_end)
            .await
    }

    async fn create_run(
        &self,
        backfill_name: &str,
        dry_run: bool,
        parameters: HashMap<String, Vec<u8>>,
        range_start: Option<&str>,
        range_end: Option<&str>,
    ) -> Result<Arc<dyn RunHandle>> {
        {
            let configured = self.configured.lock();
            let configured = configured.as_ref().ok_or_else(|| {
                BackfillError::validation(
                    "Must register the service before creating a backfill run",
                )
            })?;
            if !configured
                .request
                .backfill_names()
                .any(|name| name == backfill_name)
            {
                return Err(BackfillError::validation(format!(
                    "Backfill '{backfill_name}' was not registered with the service"
                )));
            }
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        let config = RunConfig {
            dry_run,
            parameters,
            range_start: range_start.map(ToString::to_string),
            range_end: range_end.map(ToString::to_string),
            max_batch_span: None,
        };

        self.service
            .prepare_backfill(PrepareBackfillRequest {
                backfill_name: backfill_name.to_string(),
                run_id,
                config,
            })
            .await?;

        self.service.run_handle(backfill_name, run_id)
    }
}

#[async_trait]
impl CoordinatorApi for EmbeddedCoordinator {
    /// Accept exactly one service registration per coordinator lifetime. A
    /// second attempt is a misuse error, never silently ignored; the
    /// substitute has no notion of re-registration or versioning.
    async fn configure_service(
        &self,
        request: ConfigureServiceRequest,
    ) -> Result<ConfigureServiceResponse> {
        if request.connector_type != CONNECTOR_TYPE_HTTP {
            return Err(BackfillError::validation(format!(
                "Embedded coordinator only supports HTTP connectors, got '{}'",
                request.connector_type
            )));
        }

        let mut configured = self.configured.lock();
        if configured.is_some() {
            return Err(BackfillError::ServiceAlreadyConfigured);
        }

        info!(
            backfills = request.backfills.len(),
            "Embedded coordinator configured"
        );
        *configured = Some(ConfiguredService {
            request,
            configured_at: Utc::now(),
        });

        Ok(ConfigureServiceResponse::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backfill::{Backfill, BackfillContext};
    use crate::client::protocol::BackfillData;
    use crate::cursor::BatchRange;
    use crate::registry::CatalogBuilder;

    struct NoopBackfill;

    #[async_trait]
    impl Backfill for NoopBackfill {
        const NAME: &'static str = "NoopBackfill";
        type Record = ();

        async fn key_bounds(&self, _ctx: &BackfillContext) -> Result<BatchRange> {
            Ok(BatchRange::new("a", "z"))
        }

        async fn select(&self, _range: &BatchRange, _ctx: &BackfillContext) -> Result<Vec<()>> {
            Ok(vec![])
        }

        async fn apply(&self, _records: Vec<()>, _ctx: &BackfillContext) -> Result<()> {
            Ok(())
        }
    }

    fn coordinator() -> EmbeddedCoordinator {
        let mut builder = CatalogBuilder::new();
        builder.register(|| NoopBackfill).unwrap();
        EmbeddedCoordinator::new(builder.build())
    }

    fn configure_request() -> ConfigureServiceRequest {
        ConfigureServiceRequest {
            backfills: vec![BackfillData {
                name: "NoopBackfill".to_string(),
            }],
            connector_type: CONNECTOR_TYPE_HTTP.to_string(),
            connector_extra_data: None,
            slack_channel: None,
        }
    }

    #[tokio::test]
    async fn test_second_configure_rejected() {
        let coordinator = coordinator();
        coordinator
            .configure_service(configure_request())
            .await
            .unwrap();

        let err = coordinator
            .configure_service(configure_request())
            .await
            .unwrap_err();
        assert!(matches!(err, BackfillError::ServiceAlreadyConfigured));
    }

    #[tokio::test]
    async fn test_non_http_connector_rejected() {
        let coordinator = coordinator();
        let request = ConfigureServiceRequest {
            connector_type: "ENVOY".to_string(),
            ..configure_request()
        };
        assert!(coordinator.configure_service(request).await.is_err());
    }

    #[tokio::test]
    async fn test_create_run_requires_configuration() {
        let coordinator = coordinator();
        let err = coordinator
            .create_wet_run("NoopBackfill", HashMap::new(), None, None)
            .await
            .err();
        assert!(matches!(err, Some(BackfillError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_create_run_requires_advertised_backfill() {
        let coordinator = coordinator();
        // Configure with an empty catalog advertisement.
        coordinator
            .configure_service(ConfigureServiceRequest {
                backfills: vec![],
                ..configure_request()
            })
            .await
            .unwrap();

        let err = coordinator
            .create_wet_run("NoopBackfill", HashMap::new(), None, None)
            .await
            .err();
        assert!(matches!(err, Some(BackfillError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_run_ids_count_up_from_seed() {
        let coordinator = coordinator();
        coordinator
            .configure_service(configure_request())
            .await
            .unwrap();

        let first = coordinator
            .create_dry_run("NoopBackfill", HashMap::new(), None, None)
            .await
            .unwrap();
        let second = coordinator
            .create_wet_run("NoopBackfill", HashMap::new(), None, None)
            .await
            .unwrap();

        assert_eq!(first.identity().run_id, FIRST_EMBEDDED_RUN_ID);
        assert_eq!(second.identity().run_id, FIRST_EMBEDDED_RUN_ID + 1);
        assert!(first.config().dry_run);
        assert!(!second.config().dry_run);
    }

    #[tokio::test]
    async fn test_independent_coordinators_in_one_process() {
        let a = coordinator();
        let b = coordinator();
        a.configure_service(configure_request()).await.unwrap();
        // The registration slot is per-instance, not process-global.
        b.configure_service(configure_request()).await.unwrap();
    }
}
