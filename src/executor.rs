//! # Batch Executor
//!
//! Applies one backfill's transformation to all records in a single batch
//! range and summarizes the outcome. The executor is the enforcement point
//! for dry-run isolation: in dry-run mode the capability's mutating step is
//! never invoked, even if a buggy implementation fails to check the flag
//! itself.
//!
//! Failure handling is whole-batch: if selection or application fails, the
//! batch reports `succeeded = false` with error detail and no partial
//! credit. Records are never silently dropped.

use crate::backfill::{Backfill, BackfillContext};
use crate::cursor::BatchRange;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, warn};

/// Outcome summary for one executed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Records applied, or in dry-run mode the count that would be affected.
    pub records_processed: u64,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl BatchResult {
    pub fn success(records_processed: u64) -> Self {
        Self {
            records_processed,
            succeeded: true,
            error_detail: None,
        }
    }

    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            records_processed: 0,
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Stateless batch execution engine.
///
/// The executor holds no cursor and no run state; it is invoked by the
/// operator with everything a single batch needs. Cursor advancement happens
/// in the operator, only after a successful result.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor;

impl BatchExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Execute one batch of `backfill` over `range`.
    ///
    /// Errors from the capability are captured into the returned
    /// [`BatchResult`] rather than propagated, so callers always get an
    /// outcome summary to report upward.
    pub async fn execute<B: Backfill>(
        &self,
        range: &BatchRange,
        ctx: &BackfillContext,
        backfill: &B,
    ) -> Result<BatchResult> {
        let started = Instant::now();

        let records = match backfill.select(range, ctx).await {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    backfill = B::NAME,
                    range = %range,
                    error = %e,
                    "Record selection failed, aborting batch"
                );
                return Ok(BatchResult::failure(format!("selection failed: {e}")));
            }
        };
        let selected = records.len() as u64;

        if ctx.dry_run {
            // Simulated apply: count only, no mutating call reaches the
            // capability.
            debug!(
                backfill = B::NAME,
                range = %range,
                records = selected,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Dry-run batch complete"
            );
            return Ok(BatchResult::success(selected));
        }

        if let Err(e) = backfill.apply(records, ctx).await {
            warn!(
                backfill = B::NAME,
                range = %range,
                records = selected,
                error = %e,
                "Batch application failed"
            );
            return Ok(BatchResult::failure(e.to_string()));
        }

        debug!(
            backfill = B::NAME,
            range = %range,
            records = selected,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch complete"
        );
        Ok(BatchResult::success(selected))
    }
}
