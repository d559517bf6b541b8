//! # Backfill Operator
//!
//! Owns the lifecycle of one running backfill instance: its identity, its
//! run configuration, its cursor, and the serialized batch-processing path.
//!
//! ## State machine
//!
//! ```text
//! Created -> Running -> { Paused, Done, Failed }
//!                        Paused -> Running
//! ```
//!
//! `Failed` is terminal: retrying requires a new run, which starts from the
//! last successfully advanced cursor; failure never rewinds the cursor.
//! There is deliberately no half-advanced cursor state; the cursor, not an
//! in-flight batch, is the unit of resumability.
//!
//! ## Concurrency
//!
//! At most one batch executes at a time per run. A second `run_batch`
//! arriving while one is outstanding is rejected with
//! `BatchAlreadyInFlight`, never queued, via a single-slot in-flight marker.
//! Pausing is cooperative: an in-flight batch finishes (and advances the
//! cursor) before the pause takes effect.

use crate::backfill::{Backfill, BackfillContext};
use crate::cursor::{key_span, BatchRange, Cursor};
use crate::error::{BackfillError, Result};
use crate::executor::{BatchExecutor, BatchResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle states for one backfill run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Operator instantiated, no batch processed yet
    Created,
    /// Batches are being planned and executed
    Running,
    /// Externally paused; cursor untouched until resumed
    Paused,
    /// Key range exhausted
    Done,
    /// A batch failed; a new run is required to retry
    Failed,
}

impl RunState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Check if batches may currently be processed
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid run state: {s}")),
        }
    }
}

/// Identity of one backfill run: the backfill's catalog name plus the
/// coordinator-assigned run id. Immutable for the run's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunIdentity {
    pub backfill_name: String,
    pub run_id: u64,
}

impl RunIdentity {
    pub fn new(backfill_name: impl Into<String>, run_id: u64) -> Self {
        Self {
            backfill_name: backfill_name.into(),
            run_id,
        }
    }
}

impl fmt::Display for RunIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.backfill_name, self.run_id)
    }
}

/// Immutable per-run configuration, set once at run creation. Changing any
/// of these means creating a new run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// When true the run simulates effects without mutating external state.
    pub dry_run: bool,
    /// Opaque backfill-specific parameters.
    #[serde(default)]
    pub parameters: HashMap<String, Vec<u8>>,
    /// Optional restriction of the overall key range.
    pub range_start: Option<String>,
    pub range_end: Option<String>,
    /// Maximum batch span in leading-byte key units. Defaults to half the
    /// overall run span, resolved at preparation.
    pub max_batch_span: Option<u32>,
}

impl RunConfig {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn wet_run() -> Self {
        Self::default()
    }

    pub fn with_range(
        mut self,
        start: Option<impl Into<String>>,
        end: Option<impl Into<String>>,
    ) -> Self {
        self.range_start = start.map(Into::into);
        self.range_end = end.map(Into::into);
        self
    }

    pub fn with_parameters(mut self, parameters: HashMap<String, Vec<u8>>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Single-writer progress state, mutated only on the serialized
/// batch-processing path.
#[derive(Debug)]
struct Progress {
    state: RunState,
    cursor: Cursor,
}

/// Type-erased surface of one live run, used by the registry and the
/// coordinator protocol handlers. The concrete operator is generic over its
/// [`Backfill`] implementation.
#[async_trait]
pub trait RunHandle: Send + Sync {
    fn identity(&self) -> &RunIdentity;

    fn config(&self) -> &RunConfig;

    fn state(&self) -> RunState;

    /// Snapshot of the current cursor.
    fn cursor(&self) -> Cursor;

    /// Plan the next batch range. Idempotent: repeated calls without an
    /// intervening successful batch return the same range. Returns `None`
    /// when the run range is exhausted (and marks the run `Done`).
    fn next_batch_range(&self) -> Result<Option<BatchRange>>;

    /// Execute one batch. `range` must match the operator's expected next
    /// range exactly. The cursor advances only on success.
    async fn run_batch(&self, range: &BatchRange) -> Result<BatchResult>;

    fn pause(&self) -> Result<()>;

    fn resume(&self) -> Result<()>;

    /// Drive the run until the range is exhausted, returning the total
    /// records processed. Fails fast on the first failed batch.
    async fn run_to_completion(&self) -> Result<u64>;
}

/// RAII single-slot in-flight marker. Acquisition fails instead of blocking
/// so a concurrent second batch is rejected, never queued.
struct InFlightGuard<'a> {
    slot: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(slot: &'a AtomicBool) -> Option<Self> {
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then_some(Self { slot })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(false, Ordering::Release);
    }
}

/// The in-process runtime owner of one backfill run.
pub struct BackfillOperator<B: Backfill> {
    identity: RunIdentity,
    config: RunConfig,
    ctx: BackfillContext,
    backfill: B,
    executor: BatchExecutor,
    max_batch_span: u32,
    progress: Mutex<Progress>,
    in_flight: AtomicBool,
}

impl<B: Backfill> BackfillOperator<B> {
    /// Prepare a new operator: resolve the effective key range (run config
    /// bounds override the capability's full bounds) and build the initial
    /// cursor.
    pub async fn prepare(identity: RunIdentity, config: RunConfig, backfill: B) -> Result<Self> {
        let ctx = BackfillContext::new(config.parameters.clone(), config.dry_run);

        let bounds = backfill.key_bounds(&ctx).await?;
        let start = config.range_start.clone().unwrap_or(bounds.start);
        let end = config.range_end.clone().unwrap_or(bounds.end);
        if start > end {
            return Err(BackfillError::validation(format!(
                "range start '{start}' is after range end '{end}'"
            )));
        }

        // Default to halving the overall span, so a freshly prepared run
        // plans its first batch at the range midpoint.
        let overall_span = key_span(&start, &end);
        let max_batch_span = config
            .max_batch_span
            .unwrap_or_else(|| overall_span.div_ceil(2).max(1));

        let cursor = Cursor::new(start, end);
        info!(
            run = %identity,
            dry_run = config.dry_run,
            cursor = %cursor,
            max_batch_span,
            "Prepared backfill run"
        );

        Ok(Self {
            identity,
            config,
            ctx,
            backfill,
            executor: BatchExecutor::new(),
            max_batch_span,
            progress: Mutex::new(Progress {
                state: RunState::Created,
                cursor,
            }),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Prepare and immediately type-erase, for registry storage.
    pub async fn prepare_handle(
        identity: RunIdentity,
        config: RunConfig,
        backfill: B,
    ) -> Result<Arc<dyn RunHandle>>
    where
        B: 'static,
    {
        Ok(Arc::new(Self::prepare(identity, config, backfill).await?))
    }
}

#[async_trait]
impl<B: Backfill + 'static> RunHandle for BackfillOperator<B> {
    fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    fn config(&self) -> &RunConfig {
        &self.config
    }

    fn state(&self) -> RunState {
        self.progress.lock().state
    }

    fn cursor(&self) -> Cursor {
        self.progress.lock().cursor.clone()
    }

    fn next_batch_range(&self) -> Result<Option<BatchRange>> {
        let mut progress = self.progress.lock();
        match progress.state {
            RunState::Created => progress.state = RunState::Running,
            RunState::Running => {}
            RunState::Done => return Ok(None),
            state => {
                return Err(BackfillError::invalid_state(
                    state.to_string(),
                    "next_batch_range",
                ))
            }
        }

        if !progress.cursor.has_next() {
            progress.state = RunState::Done;
            info!(run = %self.identity, "Run range exhausted");
            return Ok(None);
        }

        Ok(progress.cursor.plan_next(self.max_batch_span))
    }

    async fn run_batch(&self, range: &BatchRange) -> Result<BatchResult> {
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or_else(|| {
            BackfillError::batch_already_in_flight(
                &self.identity.backfill_name,
                self.identity.run_id,
            )
        })?;

        // Validate state and the full range before any work, so a rejected
        // instruction leaves the operator untouched and never reaches the
        // executor. The lock is released across the batch itself, the
        // in-flight guard serializes it.
        {
            let mut progress = self.progress.lock();
            match progress.state {
                RunState::Created | RunState::Running => {}
                state => {
                    return Err(BackfillError::invalid_state(state.to_string(), "run_batch"))
                }
            }
            progress.cursor.validate_next(range)?;
            progress.state = RunState::Running;
        }

        debug!(run = %self.identity, range = %range, "Executing batch");
        let result = self.executor.execute(range, &self.ctx, &self.backfill).await?;

        let mut progress = self.progress.lock();
        if result.succeeded {
            progress.cursor = progress.cursor.advance(range)?;
            if progress.state == RunState::Running && !progress.cursor.has_next() {
                progress.state = RunState::Done;
                info!(run = %self.identity, "Run complete");
            }
        } else {
            warn!(
                run = %self.identity,
                range = %range,
                error = result.error_detail.as_deref().unwrap_or("unknown"),
                "Batch failed, run transitioning to failed"
            );
            progress.state = RunState::Failed;
        }

        Ok(result)
    }

    fn pause(&self) -> Result<()> {
        let mut progress = self.progress.lock();
        match progress.state {
            RunState::Created | RunState::Running => {
                progress.state = RunState::Paused;
                info!(run = %self.identity, "Run paused");
                Ok(())
            }
            RunState::Paused => Ok(()),
            state => Err(BackfillError::invalid_state(state.to_string(), "pause")),
        }
    }

    fn resume(&self) -> Result<()> {
        let mut progress = self.progress.lock();
        match progress.state {
            RunState::Paused => {
                progress.state = RunState::Running;
                info!(run = %self.identity, cursor = %progress.cursor, "Run resumed");
                Ok(())
            }
            RunState::Created | RunState::Running => Ok(()),
            state => Err(BackfillError::invalid_state(state.to_string(), "resume")),
        }
    }

    async fn run_to_completion(&self) -> Result<u64> {
        let mut total = 0u64;
        while let Some(range) = self.next_batch_range()? {
            let result = self.run_batch(&range).await?;
            if !result.succeeded {
                return Err(BackfillError::execution(
                    result
                        .error_detail
                        .unwrap_or_else(|| "batch failed".to_string()),
                ));
            }
            total += result.records_processed;
        }
        Ok(total)
    }
}
