//! # Coordinator Protocol Client
//!
//! The network-facing side of the engine: the wire shapes exchanged with
//! the coordinator, the three request handlers the coordinator invokes
//! (prepare / next-batch-range / run-batch), and the best-effort startup
//! handshake that registers this process's backfill catalog.
//!
//! Wire encoding is a collaborator concern; this module fixes the request
//! and response shapes plus their idempotence semantics, not the transport.

pub mod protocol;
pub mod remote;
pub mod service;
pub mod startup;

use crate::error::Result;
use async_trait::async_trait;
use protocol::{ConfigureServiceRequest, ConfigureServiceResponse};

/// The engine-to-coordinator surface: one interface, two implementations,
/// the network-backed stub ([`remote::RemoteCoordinator`]) and the
/// in-process substitute ([`crate::embedded::EmbeddedCoordinator`]).
/// Selection happens in dependency wiring, outside the core engine.
#[async_trait]
pub trait CoordinatorApi: Send + Sync {
    /// Register this process's backfill catalog with the coordinator.
    async fn configure_service(
        &self,
        request: ConfigureServiceRequest,
    ) -> Result<ConfigureServiceResponse>;
}

pub use protocol::{
    BackfillData, GetNextBatchRangeRequest, GetNextBatchRangeResponse, HttpConnectorData,
    PrepareBackfillRequest, PrepareBackfillResponse, RunBatchRequest, RunBatchResponse,
    CONNECTOR_TYPE_HTTP,
};
pub use remote::RemoteCoordinator;
pub use service::BackfillService;
pub use startup::StartupConfigurator;
