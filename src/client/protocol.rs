//! Wire shapes for the coordinator protocol.
//!
//! These are the serde-serializable request/response structures carried
//! across the coordinator boundary. They deliberately mirror the data model
//! of the engine (`RunIdentity`, `RunConfig`, `Cursor`, `BatchRange`,
//! `BatchResult`) rather than inventing a second vocabulary.

use crate::cursor::{BatchRange, Cursor};
use crate::executor::BatchResult;
use crate::operator::{RunConfig, RunIdentity, RunState};
use serde::{Deserialize, Serialize};

/// Connector type advertised in the startup handshake. This client only
/// supports HTTP callbacks.
pub const CONNECTOR_TYPE_HTTP: &str = "HTTP";

/// One backfill entry in the advertised catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillData {
    pub name: String,
}

/// Startup handshake: the full catalog of backfills available in this
/// process, plus how the coordinator can reach back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureServiceRequest {
    pub backfills: Vec<BackfillData>,
    pub connector_type: String,
    /// Connector-specific payload, JSON-encoded ([`HttpConnectorData`] for
    /// HTTP connectors).
    pub connector_extra_data: Option<String>,
    pub slack_channel: Option<String>,
}

impl ConfigureServiceRequest {
    /// Names of the advertised backfills.
    pub fn backfill_names(&self) -> impl Iterator<Item = &str> {
        self.backfills.iter().map(|b| b.name.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureServiceResponse {}

/// HTTP connector payload: the URL the coordinator calls back on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConnectorData {
    pub url: String,
}

/// Create a new run of a registered backfill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareBackfillRequest {
    pub backfill_name: String,
    /// Coordinator-assigned run id.
    pub run_id: u64,
    pub config: RunConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareBackfillResponse {
    pub identity: RunIdentity,
    /// Initial cursor bounds for the run.
    pub cursor: Cursor,
    pub state: RunState,
}

/// Idempotent planning query for the next batch range of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetNextBatchRangeRequest {
    pub backfill_name: String,
    pub run_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetNextBatchRangeResponse {
    /// The next range to process, absent when the run is complete.
    pub batch_range: Option<BatchRange>,
    pub done: bool,
}

/// Execute one batch of a run. The range must match the run's expected next
/// range exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBatchRequest {
    pub backfill_name: String,
    pub run_id: u64,
    pub batch_range: BatchRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunBatchResponse {
    pub result: BatchResult,
    /// Cursor after the batch; advanced only when the batch succeeded.
    pub cursor: Cursor,
    pub state: RunState,
}
