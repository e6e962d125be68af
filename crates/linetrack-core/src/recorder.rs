//! # Cycle Time Recorder
//!
//! The recorder is the single entry point for writing and querying the
//! cycle log. It wraps one of two storage backends:
//! - `InMemory`: a [`MemoryStore`] (fast, gone when the process exits)
//! - `Persistent`: a [`RedbStore`] (disk-backed, ACID)
//!
//! The recorder itself implements [`CycleStore`], so the scheduler, the
//! monitor and the analyzer accept either a bare store or a recorder.

use crate::storage::RedbStore;
use crate::store::{CycleStore, MemoryStore};
use crate::{
    ClearScope, CycleRecord, DurationTotals, GapTotals, LineError, RecordId, Stage, StageId,
    Timestamp,
};
use std::path::Path;

/// Storage backend for a recorder.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory log (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed log using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

/// Append-only log of completed stage cycles.
///
/// Does not implement Clone: the redb handle cannot be shared.
#[derive(Debug, Default)]
pub struct CycleTimeRecorder {
    backend: StorageBackend,
}

impl CycleTimeRecorder {
    /// Create a recorder with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a recorder with persistent redb storage at `path`.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, LineError> {
        let store = RedbStore::open(path)?;
        Ok(Self::with_store(store))
    }

    /// Create a recorder over an already opened redb store.
    #[must_use]
    pub fn with_store(store: RedbStore) -> Self {
        Self {
            backend: StorageBackend::Persistent(store),
        }
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    /// Compact the backing file. No-op for the in-memory backend.
    pub fn compact(&mut self) -> Result<(), LineError> {
        match &mut self.backend {
            StorageBackend::InMemory(_) => Ok(()),
            StorageBackend::Persistent(redb) => redb.compact(),
        }
    }

    /// Register every stage of a line, replacing earlier definitions.
    pub fn register_stages(&mut self, stages: &[Stage]) -> Result<(), LineError> {
        for stage in stages {
            self.register_stage(*stage)?;
        }
        Ok(())
    }

    /// Registered stage, or `UnknownStage` when none was registered under `id`.
    pub fn require_stage(&self, id: StageId) -> Result<Stage, LineError> {
        self.stage(id)?.ok_or(LineError::UnknownStage(id))
    }

    /// Prepare for a new run: clear `scope` and remember `start`.
    ///
    /// The clear commits before this returns, so no append of the new run
    /// can interleave with it.
    pub fn start_run(&mut self, scope: ClearScope, start: Timestamp) -> Result<u64, LineError> {
        let removed = self.clear_run(scope)?;
        self.set_run_start(start)?;
        tracing::info!(?scope, removed, start, "starting run");
        Ok(removed)
    }
}

// =============================================================================
// CYCLESTORE DISPATCH
// =============================================================================

impl CycleStore for CycleTimeRecorder {
    fn register_stage(&mut self, stage: Stage) -> Result<(), LineError> {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store.register_stage(stage),
            StorageBackend::Persistent(redb) => redb.register_stage(stage),
        }
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.stage(id),
            StorageBackend::Persistent(redb) => redb.stage(id),
        }
    }

    fn stages(&self) -> Result<Vec<Stage>, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.stages(),
            StorageBackend::Persistent(redb) => redb.stages(),
        }
    }

    fn append(
        &mut self,
        stage_id: StageId,
        enter: Timestamp,
        exit: Timestamp,
    ) -> Result<RecordId, LineError> {
        let id = match &mut self.backend {
            StorageBackend::InMemory(store) => store.append(stage_id, enter, exit)?,
            StorageBackend::Persistent(redb) => redb.append(stage_id, enter, exit)?,
        };
        tracing::trace!(stage = %stage_id, enter, exit, record = id.0, "cycle recorded");
        Ok(id)
    }

    fn clear_run(&mut self, scope: ClearScope) -> Result<u64, LineError> {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store.clear_run(scope),
            StorageBackend::Persistent(redb) => redb.clear_run(scope),
        }
    }

    fn sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<DurationTotals, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.sum_and_count(stage_id, since),
            StorageBackend::Persistent(redb) => redb.sum_and_count(stage_id, since),
        }
    }

    fn gap_sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<GapTotals, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.gap_sum_and_count(stage_id, since),
            StorageBackend::Persistent(redb) => redb.gap_sum_and_count(stage_id, since),
        }
    }

    fn first_record(&self, stage_id: StageId, since: Timestamp) -> Result<CycleRecord, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.first_record(stage_id, since),
            StorageBackend::Persistent(redb) => redb.first_record(stage_id, since),
        }
    }

    fn last_record(&self, stage_id: StageId) -> Result<CycleRecord, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.last_record(stage_id),
            StorageBackend::Persistent(redb) => redb.last_record(stage_id),
        }
    }

    fn record_count(&self, stage_id: Option<StageId>) -> Result<u64, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.record_count(stage_id),
            StorageBackend::Persistent(redb) => redb.record_count(stage_id),
        }
    }

    fn set_run_start(&mut self, start: Timestamp) -> Result<(), LineError> {
        match &mut self.backend {
            StorageBackend::InMemory(store) => store.set_run_start(start),
            StorageBackend::Persistent(redb) => redb.set_run_start(start),
        }
    }

    fn run_start(&self) -> Result<Option<Timestamp>, LineError> {
        match &self.backend {
            StorageBackend::InMemory(store) => store.run_start(),
            StorageBackend::Persistent(redb) => redb.run_start(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_recorder_is_volatile() {
        let recorder = CycleTimeRecorder::new();
        assert!(!recorder.is_persistent());
        assert!(matches!(recorder.backend, StorageBackend::InMemory(_)));
    }

    #[test]
    fn start_run_clears_and_marks_start() {
        let mut recorder = CycleTimeRecorder::new();
        recorder.append(StageId(0), 0, 100).expect("append");
        recorder.append(StageId(1), 100, 200).expect("append");

        let removed = recorder.start_run(ClearScope::All, 5_000).expect("start");
        assert_eq!(removed, 2);
        assert_eq!(recorder.run_start().expect("run start"), Some(5_000));
        assert_eq!(recorder.record_count(None).expect("count"), 0);
    }

    #[test]
    fn require_stage_reports_unknown() {
        let mut recorder = CycleTimeRecorder::new();
        recorder
            .register_stages(&[Stage::new(StageId(0), 1.0), Stage::new(StageId(1), 2.0)])
            .expect("register");

        let stage = recorder.require_stage(StageId(1)).expect("stage");
        assert!((stage.ideal_cycle_time - 2.0).abs() < f64::EPSILON);
        assert!(matches!(
            recorder.require_stage(StageId(4)),
            Err(LineError::UnknownStage(StageId(4)))
        ));
    }

    #[test]
    fn backends_answer_identically() {
        let temp = tempdir().expect("temp dir");
        let mut memory = CycleTimeRecorder::new();
        let mut persistent =
            CycleTimeRecorder::with_redb(temp.path().join("cycles.redb")).expect("open");
        assert!(persistent.is_persistent());

        for recorder in [&mut memory, &mut persistent] {
            recorder.append(StageId(1), 0, 100).expect("append");
            recorder.append(StageId(1), 150, 300).expect("append");
            recorder.append(StageId(1), 350, 500).expect("append");
        }

        for since in [0, 100, 300, 501] {
            let a = memory.sum_and_count(StageId(1), since).ok();
            let b = persistent.sum_and_count(StageId(1), since).ok();
            assert_eq!(a, b, "sum_and_count since {since}");

            let a = memory.gap_sum_and_count(StageId(1), since).ok();
            let b = persistent.gap_sum_and_count(StageId(1), since).ok();
            assert_eq!(a, b, "gap_sum_and_count since {since}");

            let a = memory.first_record(StageId(1), since).ok();
            let b = persistent.first_record(StageId(1), since).ok();
            assert_eq!(a, b, "first_record since {since}");
        }
        assert_eq!(
            memory.last_record(StageId(1)).ok(),
            persistent.last_record(StageId(1)).ok()
        );
    }

    #[test]
    fn compact_is_noop_in_memory() {
        let mut recorder = CycleTimeRecorder::new();
        recorder.compact().expect("compact");
    }
}
