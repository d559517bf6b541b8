//! # Backfill Service
//!
//! The engine-side request surface consumed by the coordinator. Three
//! handlers, addressed by `(backfill_name, run_id)`:
//!
//! - **prepare_backfill**: create a fresh operator for a new run via the
//!   catalog; fast, no data-source I/O beyond resolving key bounds.
//! - **get_next_batch_range**: idempotent planning query; never mutates
//!   the cursor, so calling it twice without an intervening successful
//!   batch returns the identical range.
//! - **run_batch**: execute one batch through the operator; the cursor
//!   advances only on success, and a range that does not match the
//!   operator's expected next range is rejected with `OutOfOrderRange`.
//!
//! Batch-level failures come back as a descriptive [`BatchResult`] in the
//! response; protocol-level misuse (unknown backfill or run, out-of-order
//! range, concurrent batch) comes back as an error.

use crate::client::protocol::{
    GetNextBatchRangeRequest, GetNextBatchRangeResponse, PrepareBackfillRequest,
    PrepareBackfillResponse, RunBatchRequest, RunBatchResponse,
};
use crate::error::{BackfillError, Result};
use crate::operator::{RunHandle, RunIdentity};
use crate::registry::Catalog;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct RunEntry {
    handle: Arc<dyn RunHandle>,
    created_at: DateTime<Utc>,
}

/// Coordinator-facing request handlers over the catalog and the live runs
/// of this process. Cheap to clone; concurrent runs progress independently.
#[derive(Clone)]
pub struct BackfillService {
    catalog: Catalog,
    runs: Arc<DashMap<(String, u64), RunEntry>>,
}

impl BackfillService {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            runs: Arc::new(DashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Create a new operator for a run. The run id is coordinator-assigned;
    /// preparing the same identity twice is a validation error.
    pub async fn prepare_backfill(
        &self,
        request: PrepareBackfillRequest,
    ) -> Result<PrepareBackfillResponse> {
        let key = (request.backfill_name.clone(), request.run_id);
        if self.runs.contains_key(&key) {
            return Err(BackfillError::validation(format!(
                "run {} of backfill '{}' is already prepared",
                request.run_id, request.backfill_name
            )));
        }

        let handle = self
            .catalog
            .create(&request.backfill_name, request.run_id, request.config)
            .await?;

        let response = PrepareBackfillResponse {
            identity: handle.identity().clone(),
            cursor: handle.cursor(),
            state: handle.state(),
        };

        info!(
            run = %response.identity,
            dry_run = handle.config().dry_run,
            "Prepared backfill run"
        );
        self.runs.insert(
            key,
            RunEntry {
                handle,
                created_at: Utc::now(),
            },
        );

        Ok(response)
    }

    /// Plan the next batch range for a run. Pure query: the cursor is not
    /// mutated, only `run_batch`'s success path moves it.
    pub fn get_next_batch_range(
        &self,
        request: GetNextBatchRangeRequest,
    ) -> Result<GetNextBatchRangeResponse> {
        let handle = self.run_handle(&request.backfill_name, request.run_id)?;
        let batch_range = handle.next_batch_range()?;

        debug!(
            backfill = %request.backfill_name,
            run_id = request.run_id,
            range = ?batch_range,
            "Planned next batch range"
        );
        Ok(GetNextBatchRangeResponse {
            done: batch_range.is_none(),
            batch_range,
        })
    }

    /// Execute one batch for a run and report the outcome.
    pub async fn run_batch(&self, request: RunBatchRequest) -> Result<RunBatchResponse> {
        let handle = self.run_handle(&request.backfill_name, request.run_id)?;
        let result = handle.run_batch(&request.batch_range).await?;

        Ok(RunBatchResponse {
            result,
            cursor: handle.cursor(),
            state: handle.state(),
        })
    }

    /// Pause a run. Cooperative: an in-flight batch finishes first.
    pub fn pause_run(&self, identity: &RunIdentity) -> Result<()> {
        self.run_handle(&identity.backfill_name, identity.run_id)?
            .pause()
    }

    /// Resume a paused run from its unchanged cursor.
    pub fn resume_run(&self, identity: &RunIdentity) -> Result<()> {
        self.run_handle(&identity.backfill_name, identity.run_id)?
            .resume()
    }

    /// Look up a live run's handle.
    pub fn run_handle(&self, backfill_name: &str, run_id: u64) -> Result<Arc<dyn RunHandle>> {
        self.runs
            .get(&(backfill_name.to_string(), run_id))
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| BackfillError::unknown_run(backfill_name, run_id))
    }

    /// Release a completed or abandoned run.
    pub fn release_run(&self, identity: &RunIdentity) -> Result<()> {
        self.runs
            .remove(&(identity.backfill_name.clone(), identity.run_id))
            .map(|(_, entry)| {
                info!(
                    run = %identity,
                    created_at = %entry.created_at.to_rfc3339(),
                    "Released backfill run"
                );
            })
            .ok_or_else(|| {
                BackfillError::unknown_run(identity.backfill_name.clone(), identity.run_id)
            })
    }

    /// Number of live runs tracked by this service.
    pub fn live_runs(&self) -> usize {
        self.runs.len()
    }
}
