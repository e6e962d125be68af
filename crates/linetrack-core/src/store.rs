//! # Cycle Store
//!
//! The append-only cycle log behind the recorder.
//!
//! This module defines the `CycleStore` trait, the in-memory `MemoryStore`,
//! and the ordered aggregations both stores share. All data structures use
//! `BTreeMap` for deterministic ordering.

use crate::{
    ClearScope, CycleRecord, DurationTotals, GapTotals, LineError, RecordId, Stage, StageId,
    Timestamp,
};
use std::collections::BTreeMap;

// =============================================================================
// CYCLESTORE TRAIT
// =============================================================================

/// Storage operations for the stage registry and the cycle log.
///
/// Record ids are assigned by the store, start at 1 and are strictly
/// increasing across all stages. Clearing records never rewinds the sequence.
///
/// The four query shapes fail with `LineError::NotFound` when nothing
/// qualifies.
pub trait CycleStore {
    /// Register or replace a stage definition.
    fn register_stage(&mut self, stage: Stage) -> Result<(), LineError>;

    /// Look up a registered stage.
    fn stage(&self, id: StageId) -> Result<Option<Stage>, LineError>;

    /// All registered stages in id order.
    fn stages(&self) -> Result<Vec<Stage>, LineError>;

    /// Append a completed cycle atomically and return its id.
    ///
    /// Fails with `InvalidCycle` when `exit < enter`; nothing is written.
    fn append(
        &mut self,
        stage_id: StageId,
        enter: Timestamp,
        exit: Timestamp,
    ) -> Result<RecordId, LineError>;

    /// Delete every record in `scope` in one atomic step. Returns the count removed.
    fn clear_run(&mut self, scope: ClearScope) -> Result<u64, LineError>;

    /// Sum and count of durations for records with `exit >= since`.
    fn sum_and_count(&self, stage_id: StageId, since: Timestamp)
    -> Result<DurationTotals, LineError>;

    /// Sum and count of gaps between id-adjacent records with `exit >= since`.
    fn gap_sum_and_count(&self, stage_id: StageId, since: Timestamp)
    -> Result<GapTotals, LineError>;

    /// Record with `exit >= since` and the smallest exit; ties go to the smallest id.
    fn first_record(&self, stage_id: StageId, since: Timestamp) -> Result<CycleRecord, LineError>;

    /// Record with the largest id for the stage.
    fn last_record(&self, stage_id: StageId) -> Result<CycleRecord, LineError>;

    /// Number of stored records, for one stage or all of them.
    fn record_count(&self, stage_id: Option<StageId>) -> Result<u64, LineError>;

    /// Remember the start time of the current run.
    fn set_run_start(&mut self, start: Timestamp) -> Result<(), LineError>;

    /// Start time of the most recent run, if one was recorded.
    fn run_start(&self) -> Result<Option<Timestamp>, LineError>;
}

// =============================================================================
// ORDERED AGGREGATIONS
// =============================================================================

/// Aggregations over one stage's records in ascending id order.
///
/// Both stores feed their per-stage scan through these functions so the
/// filtering and gap semantics cannot drift apart.
pub(crate) mod aggregate {
    use super::*;

    /// Duration totals over records with `exit >= since`.
    pub(crate) fn duration_totals<I>(stage_id: StageId, records: I, since: Timestamp) -> Result<DurationTotals, LineError>
    where
        I: IntoIterator<Item = CycleRecord>,
    {
        let mut totals = DurationTotals { sum_ms: 0, count: 0 };
        for record in records.into_iter().filter(|r| r.exit >= since) {
            totals.sum_ms = totals.sum_ms.saturating_add(record.duration);
            totals.count += 1;
        }
        if totals.count == 0 {
            return Err(LineError::NotFound(stage_id));
        }
        Ok(totals)
    }

    /// Gap totals over id-adjacent pairs after filtering to `exit >= since`.
    ///
    /// The first qualifying record contributes no gap.
    pub(crate) fn gap_totals<I>(stage_id: StageId, records: I, since: Timestamp) -> Result<GapTotals, LineError>
    where
        I: IntoIterator<Item = CycleRecord>,
    {
        let mut totals = GapTotals { sum_ms: 0, count: 0 };
        let mut previous_exit: Option<Timestamp> = None;
        for record in records.into_iter().filter(|r| r.exit >= since) {
            if let Some(exit) = previous_exit {
                totals.sum_ms = totals.sum_ms.saturating_add(record.enter - exit);
                totals.count += 1;
            }
            previous_exit = Some(record.exit);
        }
        if totals.count == 0 {
            return Err(LineError::NotFound(stage_id));
        }
        Ok(totals)
    }

    /// Earliest-exiting record with `exit >= since`; the scan is in id order,
    /// so keeping the first minimum breaks ties by smallest id.
    pub(crate) fn first_since<I>(stage_id: StageId, records: I, since: Timestamp) -> Result<CycleRecord, LineError>
    where
        I: IntoIterator<Item = CycleRecord>,
    {
        let mut best: Option<CycleRecord> = None;
        for record in records.into_iter().filter(|r| r.exit >= since) {
            if best.is_none_or(|b| record.exit < b.exit) {
                best = Some(record);
            }
        }
        best.ok_or(LineError::NotFound(stage_id))
    }
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Volatile cycle store.
///
/// Used for simulated runs that report in-process and for tests.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    /// Registered stages.
    stages: BTreeMap<StageId, Stage>,
    /// Per-stage records, each vector in ascending id order.
    records: BTreeMap<StageId, Vec<CycleRecord>>,
    /// Next id to assign.
    next_record_id: u64,
    /// Start of the most recent run.
    run_start: Option<Timestamp>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            stages: BTreeMap::new(),
            records: BTreeMap::new(),
            next_record_id: 1,
            run_start: None,
        }
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records of one stage in id order.
    pub fn records(&self, stage_id: StageId) -> impl Iterator<Item = &CycleRecord> {
        self.records.get(&stage_id).into_iter().flatten()
    }

    fn stage_records(&self, stage_id: StageId) -> impl Iterator<Item = CycleRecord> + '_ {
        self.records(stage_id).copied()
    }
}

impl CycleStore for MemoryStore {
    fn register_stage(&mut self, stage: Stage) -> Result<(), LineError> {
        self.stages.insert(stage.id, stage);
        Ok(())
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, LineError> {
        Ok(self.stages.get(&id).copied())
    }

    fn stages(&self) -> Result<Vec<Stage>, LineError> {
        Ok(self.stages.values().copied().collect())
    }

    fn append(
        &mut self,
        stage_id: StageId,
        enter: Timestamp,
        exit: Timestamp,
    ) -> Result<RecordId, LineError> {
        let id = RecordId(self.next_record_id);
        let record = CycleRecord::new(id, stage_id, enter, exit)?;
        self.records.entry(stage_id).or_default().push(record);
        self.next_record_id = self.next_record_id.saturating_add(1);
        Ok(id)
    }

    fn clear_run(&mut self, scope: ClearScope) -> Result<u64, LineError> {
        let mut removed = 0u64;
        self.records.retain(|stage, records| {
            if scope.covers(*stage) {
                removed += records.len() as u64;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<DurationTotals, LineError> {
        aggregate::duration_totals(stage_id, self.stage_records(stage_id), since)
    }

    fn gap_sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<GapTotals, LineError> {
        aggregate::gap_totals(stage_id, self.stage_records(stage_id), since)
    }

    fn first_record(&self, stage_id: StageId, since: Timestamp) -> Result<CycleRecord, LineError> {
        aggregate::first_since(stage_id, self.stage_records(stage_id), since)
    }

    fn last_record(&self, stage_id: StageId) -> Result<CycleRecord, LineError> {
        self.records(stage_id)
            .last()
            .copied()
            .ok_or(LineError::NotFound(stage_id))
    }

    fn record_count(&self, stage_id: Option<StageId>) -> Result<u64, LineError> {
        let count = match stage_id {
            Some(id) => self.records(id).count(),
            None => self.records.values().map(Vec::len).sum(),
        };
        Ok(count as u64)
    }

    fn set_run_start(&mut self, start: Timestamp) -> Result<(), LineError> {
        self.run_start = Some(start);
        Ok(())
    }

    fn run_start(&self) -> Result<Option<Timestamp>, LineError> {
        Ok(self.run_start)
    }
}

// =============================================================================
// TESTS
// =============================================================================
