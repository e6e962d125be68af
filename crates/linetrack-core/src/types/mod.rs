//! # Core Type Definitions
//!
//! This module contains the data model shared by every linetrack component:
//! - Identifiers (`StageId`, `RecordId`) and the millisecond `Timestamp`
//! - Line topology (`Stage`)
//! - The append-only cycle log (`CycleRecord`, `ClearScope`)
//! - Typed query results (`DurationTotals`, `GapTotals`)
//! - Error types (`LineError`)
//!
//! All timestamps are milliseconds since the Unix epoch. Durations derived
//! from two timestamps are plain millisecond counts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

/// Position of a stage on the line, `0..N-1` in flow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageId(pub u32);

impl StageId {
    /// Index into per-stage arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Store-assigned identifier of a cycle record.
///
/// Ids are strictly increasing across all stages, so ordering by id is
/// ordering by handoff completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

// =============================================================================
// STAGE
// =============================================================================

/// A processing stage and its design cycle time.
///
/// Created once at startup; immutable for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Position on the line.
    pub id: StageId,
    /// Design cycle time in seconds.
    pub ideal_cycle_time: f64,
}

impl Stage {
    /// Create a new stage.
    #[must_use]
    pub const fn new(id: StageId, ideal_cycle_time: f64) -> Self {
        Self {
            id,
            ideal_cycle_time,
        }
    }

    /// Ideal cycle time in milliseconds.
    #[must_use]
    pub fn ideal_cycle_time_ms(&self) -> f64 {
        self.ideal_cycle_time * 1000.0
    }

    /// Ideal throughput in parts per minute, `ideal_cycle_time * 60`.
    #[must_use]
    pub fn ideal_ppm(&self) -> f64 {
        self.ideal_cycle_time * 60.0
    }
}

// =============================================================================
// CYCLE RECORD
// =============================================================================

/// One completed pass of an item through a stage.
///
/// Immutable once appended. `exit >= enter` always holds for stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    /// Store-assigned id.
    pub id: RecordId,
    /// Stage that processed the item.
    pub stage_id: StageId,
    /// Time the stage picked the item up.
    pub enter: Timestamp,
    /// Time the stage handed the item on.
    pub exit: Timestamp,
    /// `exit - enter`, stored so aggregations need not recompute it.
    pub duration: i64,
}

impl CycleRecord {
    /// Build a record, rejecting cycles that end before they start.
    pub fn new(
        id: RecordId,
        stage_id: StageId,
        enter: Timestamp,
        exit: Timestamp,
    ) -> Result<Self, LineError> {
        if exit < enter {
            return Err(LineError::InvalidCycle { enter, exit });
        }
        Ok(Self {
            id,
            stage_id,
            enter,
            exit,
            duration: exit - enter,
        })
    }
}

/// Which records a clear-run operation removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearScope {
    /// Records of a single stage.
    Stage(StageId),
    /// Every record of every stage.
    All,
}

impl ClearScope {
    /// Whether a record of `stage` falls inside this scope.
    #[must_use]
    pub fn covers(&self, stage: StageId) -> bool {
        match self {
            Self::Stage(id) => *id == stage,
            Self::All => true,
        }
    }
}

// =============================================================================
// QUERY RESULTS
// =============================================================================

/// Result of the sum-and-count query over cycle durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationTotals {
    /// Sum of `exit - enter` over the qualifying records.
    pub sum_ms: i64,
    /// Number of qualifying records.
    pub count: u64,
}

impl DurationTotals {
    /// Mean cycle duration in milliseconds.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_ms as f64 / self.count as f64)
    }
}

/// Result of the gap query: idle time between consecutive cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapTotals {
    /// Sum of `enter(i) - exit(i-1)` over adjacent pairs.
    pub sum_ms: i64,
    /// Number of adjacent pairs.
    pub count: u64,
}

impl GapTotals {
    /// Mean gap in milliseconds.
    #[must_use]
    pub fn average(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum_ms as f64 / self.count as f64)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the linetrack system.
///
/// - `InsufficientData` and `NotFound` are never fatal; callers report the
///   affected metric as unavailable and carry on.
/// - `InvalidCycle` indicates a scheduler fault and ends that stage's run.
/// - `StorageError` ends the run; a report built on missing records is not
///   trustworthy.
/// - `ConnectionError` is reported and retried by the event loop.
#[derive(Debug, Error)]
pub enum LineError {
    /// Not enough samples or records to compute a metric.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// A cycle whose exit precedes its enter.
    #[error("Invalid cycle: exit {exit} is before enter {enter}")]
    InvalidCycle {
        /// Enter timestamp.
        enter: Timestamp,
        /// Exit timestamp.
        exit: Timestamp,
    },

    /// A store query found no qualifying record.
    #[error("No qualifying record for stage {0}")]
    NotFound(StageId),

    /// The stage is not registered in the store or line.
    #[error("Unknown stage: {0}")]
    UnknownStage(StageId),

    /// The persistent store failed.
    #[error("Storage error: {0}")]
    StorageError(String),

    /// The event source disconnected.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Line or monitor configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every stage is waiting and no clock advance can unblock the line.
    #[error("Scheduler stalled at {0} with work remaining")]
    SchedulerStalled(Timestamp),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl LineError {
    /// Whether the error only means a metric cannot be computed yet.
    #[must_use]
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, Self::InsufficientData(_) | Self::NotFound(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_record_computes_duration() {
        let record = CycleRecord::new(RecordId(1), StageId(0), 150, 300).expect("valid");
        assert_eq!(record.duration, 150);
    }

    #[test]
    fn cycle_record_accepts_zero_length() {
        let record = CycleRecord::new(RecordId(1), StageId(0), 42, 42).expect("valid");
        assert_eq!(record.duration, 0);
    }

    #[test]
    fn cycle_record_rejects_inverted_interval() {
        let result = CycleRecord::new(RecordId(1), StageId(0), 300, 150);
        assert!(matches!(
            result,
            Err(LineError::InvalidCycle {
                enter: 300,
                exit: 150
            })
        ));
    }

    #[test]
    fn stage_ideal_rates() {
        let stage = Stage::new(StageId(0), 5.0 / 3.0);
        assert!((stage.ideal_ppm() - 100.0).abs() < 1e-9);
        assert!((stage.ideal_cycle_time_ms() - 1666.666_666).abs() < 1e-3);
    }

    #[test]
    fn clear_scope_coverage() {
        assert!(ClearScope::All.covers(StageId(7)));
        assert!(ClearScope::Stage(StageId(1)).covers(StageId(1)));
        assert!(!ClearScope::Stage(StageId(1)).covers(StageId(2)));
    }

    #[test]
    fn totals_average_empty_is_none() {
        let totals = DurationTotals { sum_ms: 0, count: 0 };
        assert!(totals.average().is_none());

        let gaps = GapTotals {
            sum_ms: 100,
            count: 2,
        };
        assert_eq!(gaps.average(), Some(50.0));
    }

    #[test]
    fn insufficient_data_classification() {
        assert!(LineError::NotFound(StageId(0)).is_insufficient_data());
        assert!(LineError::InsufficientData("gap".into()).is_insufficient_data());
        assert!(!LineError::StorageError("disk".into()).is_insufficient_data());
    }
}
