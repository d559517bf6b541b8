//! # Backfill Error Types
//!
//! Structured error handling for the backfill engine using thiserror
//! instead of `Box<dyn Error>` patterns. Every protocol-level misuse has
//! its own variant so callers can match on it rather than parse strings.

use thiserror::Error;

/// Errors surfaced by the backfill engine and its coordinator protocol surface.
#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("Backfill '{name}' is already registered")]
    DuplicateBackfillName { name: String },

    #[error("Backfill '{name}' is not registered")]
    UnknownBackfill { name: String },

    #[error("No live run {run_id} for backfill '{backfill_name}'")]
    UnknownRun { backfill_name: String, run_id: u64 },

    #[error("Out-of-order batch range: expected start '{expected}', got '{got}'")]
    OutOfOrderRange { expected: String, got: String },

    #[error("A batch is already in flight for backfill '{backfill_name}' run {run_id}")]
    BatchAlreadyInFlight { backfill_name: String, run_id: u64 },

    #[error("Batch execution failed: {detail}")]
    Execution { detail: String },

    #[error("Instruction '{instruction}' is not valid in state '{from}'")]
    InvalidState { from: String, instruction: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Backfill service is already configured for this coordinator")]
    ServiceAlreadyConfigured,

    #[error("Coordinator registration failed: {message}")]
    Registration { message: String },
}

impl BackfillError {
    /// Create a duplicate-registration error
    pub fn duplicate_backfill_name(name: impl Into<String>) -> Self {
        Self::DuplicateBackfillName { name: name.into() }
    }

    /// Create an unknown-backfill error
    pub fn unknown_backfill(name: impl Into<String>) -> Self {
        Self::UnknownBackfill { name: name.into() }
    }

    /// Create an unknown-run error
    pub fn unknown_run(backfill_name: impl Into<String>, run_id: u64) -> Self {
        Self::UnknownRun {
            backfill_name: backfill_name.into(),
            run_id,
        }
    }

    /// Create an out-of-order range error
    pub fn out_of_order_range(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::OutOfOrderRange {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// Create a batch-in-flight rejection
    pub fn batch_already_in_flight(backfill_name: impl Into<String>, run_id: u64) -> Self {
        Self::BatchAlreadyInFlight {
            backfill_name: backfill_name.into(),
            run_id,
        }
    }

    /// Create a batch execution error
    pub fn execution(detail: impl Into<String>) -> Self {
        Self::Execution {
            detail: detail.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(from: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self::InvalidState {
            from: from.into(),
            instruction: instruction.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a registration error
    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration {
            message: message.into(),
        }
    }

    /// True for rejections the caller is expected to retry or re-query,
    /// as opposed to terminal failures.
    pub fn is_retryable_rejection(&self) -> bool {
        matches!(
            self,
            Self::OutOfOrderRange { .. } | Self::BatchAlreadyInFlight { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BackfillError>;
