//! # Backfill Capability
//!
//! The user-supplied implementation of one backfill: how to select records
//! in a key range and how to apply the transformation to them. The engine
//! owns everything else (cursors, run lifecycle, the coordinator protocol).
//!
//! ## Idempotence contract
//!
//! A batch may be retried after a partial failure: a crash mid-batch or a
//! lost result report means the coordinator will hand the same range out
//! again. [`Backfill::apply`] is therefore contractually required to be
//! idempotent per record: re-applying to an already-processed record must
//! be a no-op or converge to the same state. The engine does not deduplicate
//! records on the implementor's behalf.

use crate::cursor::BatchRange;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only per-run context handed to capability calls.
#[derive(Debug, Clone, Default)]
pub struct BackfillContext {
    /// Opaque backfill-specific parameters supplied at run creation.
    pub parameters: HashMap<String, Vec<u8>>,
    /// Whether this run is a side-effect-free simulation. The executor
    /// already enforces dry-run isolation; this flag is informational so
    /// implementations can e.g. skip expensive precomputation.
    pub dry_run: bool,
}

impl BackfillContext {
    pub fn new(parameters: HashMap<String, Vec<u8>>, dry_run: bool) -> Self {
        Self {
            parameters,
            dry_run,
        }
    }

    /// Look up a parameter as a UTF-8 string.
    pub fn parameter_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// A user-defined batch transformation over a range of a dataset's keys.
///
/// Implementations declare a stable [`Backfill::NAME`] used as the catalog
/// key and by the coordinator to address the backfill, plus the dataset's
/// record type. The two operations deliberately mirror the two phases of a
/// batch: read-only selection and mutating application.
#[async_trait]
pub trait Backfill: Send + Sync {
    /// Stable identifier for this backfill, unique within a process.
    const NAME: &'static str;

    /// Record type produced by selection and consumed by application.
    type Record: Send;

    /// Full key bounds of the dataset, used when the run config does not
    /// restrict the range. Half-open `[start, end)`.
    async fn key_bounds(&self, ctx: &BackfillContext) -> Result<BatchRange>;

    /// Select the records matching `range`. Must not mutate external state.
    async fn select(
        &self,
        range: &BatchRange,
        ctx: &BackfillContext,
    ) -> Result<Vec<Self::Record>>;

    /// Apply the transformation to a set of selected records. Must be
    /// idempotent per record (see module docs). Never invoked in dry-run
    /// mode.
    async fn apply(&self, records: Vec<Self::Record>, ctx: &BackfillContext) -> Result<()>;
}
