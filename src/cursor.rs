//! # Range Cursor
//!
//! Progress tracking over a totally-ordered, string-keyed dataset range.
//!
//! The cursor is the unit of resumability for a backfill run: batches are
//! half-open key ranges `[start, end)`, and the cursor's `next_start` only
//! moves forward when a batch reports success. Planning the next range is a
//! pure query and never mutates the cursor; only [`Cursor::advance`] produces
//! a successor cursor, and it rejects ranges that do not line up exactly with
//! the expected next start.
//!
//! Batch boundaries are computed by midpoint partitioning over the leading
//! byte of the keyspace: while the remaining span exceeds the run's maximum
//! batch span, the range is split at its midpoint; otherwise the whole
//! remainder becomes the batch. Finer, record-count-aware batching belongs to
//! the data source and is out of scope here.

use crate::error::{BackfillError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A half-open key range `[start, end)` assigned for one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRange {
    pub start: String,
    pub end: String,
}

impl BatchRange {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// True when the range contains no keys.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

impl fmt::Display for BatchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Durable progress marker for one backfill run.
///
/// `next_start` is monotonically non-decreasing across successful advances
/// and never revisits a previously completed sub-range. The effective end
/// boundary is resolved once at run preparation (from the run config or the
/// capability's full key bounds) so the cursor always carries a concrete end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    /// End boundary of the most recently completed range, if any.
    pub last_completed: Option<String>,
    /// Start of the next range to process.
    pub next_start: String,
    /// Exclusive end of the overall run range.
    pub overall_end: String,
}

impl Cursor {
    /// Create the initial cursor for a run covering `[start, end)`.
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            last_completed: None,
            next_start: start.into(),
            overall_end: end.into(),
        }
    }

    /// Whether any keys remain to process.
    pub fn has_next(&self) -> bool {
        self.next_start < self.overall_end
    }

    /// Plan the next batch range without mutating the cursor.
    ///
    /// Deterministic: two consecutive calls without an intervening
    /// [`Cursor::advance`] return the identical range. Returns `None` when
    /// the run range is exhausted.
    pub fn plan_next(&self, max_batch_span: u32) -> Option<BatchRange> {
        if !self.has_next() {
            return None;
        }

        let mut end = self.overall_end.clone();
        while key_span(&self.next_start, &end) > max_batch_span {
            match midpoint_key(&self.next_start, &end) {
                Some(mid) => end = mid,
                None => break,
            }
        }

        Some(BatchRange {
            start: self.next_start.clone(),
            end,
        })
    }

    /// Check that `range` is an acceptable next range for this cursor:
    /// starts exactly at `next_start`, non-empty, and within the overall
    /// end. Fails with `OutOfOrderRange` on a start mismatch, which protects
    /// against duplicate or skipped application from stale instructions.
    pub fn validate_next(&self, range: &BatchRange) -> Result<()> {
        if range.start != self.next_start {
            return Err(BackfillError::out_of_order_range(
                &self.next_start,
                &range.start,
            ));
        }
        if range.is_empty() {
            return Err(BackfillError::validation(format!(
                "batch range {range} is empty"
            )));
        }
        if range.end > self.overall_end {
            return Err(BackfillError::validation(format!(
                "batch range {range} extends past overall end '{}'",
                self.overall_end
            )));
        }
        Ok(())
    }

    /// Produce the successor cursor after `completed` finished successfully.
    ///
    /// Pure and deterministic, so a replayed advance for the same completed
    /// range yields the same successor.
    pub fn advance(&self, completed: &BatchRange) -> Result<Cursor> {
        self.validate_next(completed)?;

        Ok(Cursor {
            last_completed: Some(completed.end.clone()),
            next_start: completed.end.clone(),
            overall_end: self.overall_end.clone(),
        })
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "next_start={} overall_end={}", self.next_start, self.overall_end)
    }
}

/// Leading byte of a key, the resolution at which batch boundaries are
/// computed. Empty keys sort first and map to 0.
fn leading_byte(key: &str) -> u8 {
    key.as_bytes().first().copied().unwrap_or(0)
}

/// Distance between two keys in leading-byte units.
pub(crate) fn key_span(start: &str, end: &str) -> u32 {
    u32::from(leading_byte(end).saturating_sub(leading_byte(start)))
}

/// Midpoint key between `start` and `end`, if one exists strictly between
/// them. Single-byte midpoints only; non-splittable spans return `None`.
fn midpoint_key(start: &str, end: &str) -> Option<String> {
    let s = leading_byte(start);
    let e = leading_byte(end);
    if e <= s {
        return None;
    }
    let mid = s + (e - s) / 2;
    if !mid.is_ascii() {
        return None;
    }
    let key = (mid as char).to_string();
    if key.as_str() > start && key.as_str() < end {
        Some(key)
    } else {
        None
    }
}
