//! # redb-backed Cycle Storage
//!
//! A disk-backed cycle store using the redb embedded database.
//!
//! Every append and every clear is a single write transaction, so a crash
//! leaves either the whole change or none of it. Reads open their own read
//! transaction and never block the writer.
//!
//! ## Layout
//!
//! Records are keyed by `(stage, record id)`. A range scan over one stage
//! therefore yields its records in id order, which is exactly the order the
//! gap query needs.

use crate::store::{CycleStore, aggregate};
use crate::{
    ClearScope, CycleRecord, DurationTotals, GapTotals, LineError, RecordId, Stage, StageId,
    Timestamp,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for stages: StageId(u32) -> serialized Stage bytes
const STAGES: TableDefinition<u32, &[u8]> = TableDefinition::new("stages");

/// Table for cycles: (stage_id, record_id) -> serialized CycleRecord bytes
const CYCLE_TIMES: TableDefinition<(u32, u64), &[u8]> = TableDefinition::new("cycle_times");

/// Table for counters: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// Table for run bookkeeping: key string -> timestamp
const RUNS: TableDefinition<&str, i64> = TableDefinition::new("runs");

const NEXT_RECORD_ID: &str = "next_record_id";
const LAST_RUN_START: &str = "last_run_start";

fn storage_error(e: impl std::fmt::Display) -> LineError {
    LineError::StorageError(e.to_string())
}

fn stage_range(stage_id: StageId) -> std::ops::RangeInclusive<(u32, u64)> {
    (stage_id.0, 0u64)..=(stage_id.0, u64::MAX)
}

/// A disk-backed cycle store using redb.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next id to assign; mirrors the persisted counter.
    next_record_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_record_id", &self.next_record_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a cycle database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LineError> {
        let db = Database::create(path.as_ref()).map_err(storage_error)?;

        // Initialize tables if they don't exist
        {
            let write_txn = db.begin_write().map_err(storage_error)?;
            let _ = write_txn.open_table(STAGES).map_err(storage_error)?;
            let _ = write_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;
            let _ = write_txn.open_table(METADATA).map_err(storage_error)?;
            let _ = write_txn.open_table(RUNS).map_err(storage_error)?;
            write_txn.commit().map_err(storage_error)?;
        }

        let next_record_id = {
            let read_txn = db.begin_read().map_err(storage_error)?;
            let table = read_txn.open_table(METADATA).map_err(storage_error)?;
            table
                .get(NEXT_RECORD_ID)
                .map_err(storage_error)?
                .map(|v| v.value())
                .unwrap_or(1)
        };

        tracing::debug!(path = %path.as_ref().display(), next_record_id, "opened cycle store");

        Ok(Self { db, next_record_id })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), LineError> {
        self.db.compact().map_err(storage_error)?;
        Ok(())
    }

    /// All records of one stage in id order.
    pub fn stage_records(&self, stage_id: StageId) -> Result<Vec<CycleRecord>, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;

        let mut records = Vec::new();
        for entry in table.range(stage_range(stage_id)).map_err(storage_error)? {
            let (_, data) = entry.map_err(storage_error)?;
            let record: CycleRecord = postcard::from_bytes(data.value())
                .map_err(|e| LineError::SerializationError(e.to_string()))?;
            records.push(record);
        }
        Ok(records)
    }
}

// =============================================================================
// CYCLESTORE TRAIT IMPLEMENTATION
// =============================================================================

impl CycleStore for RedbStore {
    fn register_stage(&mut self, stage: Stage) -> Result<(), LineError> {
        let bytes = postcard::to_allocvec(&stage)
            .map_err(|e| LineError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(STAGES).map_err(storage_error)?;
            table
                .insert(stage.id.0, bytes.as_slice())
                .map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        Ok(())
    }

    fn stage(&self, id: StageId) -> Result<Option<Stage>, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(STAGES).map_err(storage_error)?;

        match table.get(id.0).map_err(storage_error)? {
            Some(data) => {
                let stage: Stage = postcard::from_bytes(data.value())
                    .map_err(|e| LineError::SerializationError(e.to_string()))?;
                Ok(Some(stage))
            }
            None => Ok(None),
        }
    }

    fn stages(&self) -> Result<Vec<Stage>, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(STAGES).map_err(storage_error)?;

        let mut stages = Vec::new();
        for entry in table.iter().map_err(storage_error)? {
            let (_, data) = entry.map_err(storage_error)?;
            let stage: Stage = postcard::from_bytes(data.value())
                .map_err(|e| LineError::SerializationError(e.to_string()))?;
            stages.push(stage);
        }
        Ok(stages)
    }

    fn append(
        &mut self,
        stage_id: StageId,
        enter: Timestamp,
        exit: Timestamp,
    ) -> Result<RecordId, LineError> {
        let id = RecordId(self.next_record_id);
        let record = CycleRecord::new(id, stage_id, enter, exit)?;
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| LineError::SerializationError(e.to_string()))?;
        let next = self.next_record_id.saturating_add(1);

        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut cycles = write_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;
            cycles
                .insert((stage_id.0, id.0), bytes.as_slice())
                .map_err(storage_error)?;
        }
        {
            let mut meta = write_txn.open_table(METADATA).map_err(storage_error)?;
            meta.insert(NEXT_RECORD_ID, next).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;

        // Only advance once the record is durable.
        self.next_record_id = next;
        Ok(id)
    }

    fn clear_run(&mut self, scope: ClearScope) -> Result<u64, LineError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        let removed = {
            let mut table = write_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;

            let mut keys = Vec::new();
            {
                let entries = match scope {
                    ClearScope::Stage(stage_id) => {
                        table.range(stage_range(stage_id)).map_err(storage_error)?
                    }
                    ClearScope::All => table.iter().map_err(storage_error)?,
                };
                for entry in entries {
                    let (key, _) = entry.map_err(storage_error)?;
                    keys.push(key.value());
                }
            }

            for key in &keys {
                table.remove(*key).map_err(storage_error)?;
            }
            keys.len() as u64
        };
        write_txn.commit().map_err(storage_error)?;

        tracing::debug!(?scope, removed, "cleared cycle records");
        Ok(removed)
    }

    fn sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<DurationTotals, LineError> {
        aggregate::duration_totals(stage_id, self.stage_records(stage_id)?, since)
    }

    fn gap_sum_and_count(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<GapTotals, LineError> {
        aggregate::gap_totals(stage_id, self.stage_records(stage_id)?, since)
    }

    fn first_record(&self, stage_id: StageId, since: Timestamp) -> Result<CycleRecord, LineError> {
        aggregate::first_since(stage_id, self.stage_records(stage_id)?, since)
    }

    fn last_record(&self, stage_id: StageId) -> Result<CycleRecord, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;

        let last = table
            .range(stage_range(stage_id))
            .map_err(storage_error)?
            .next_back();
        match last {
            Some(entry) => {
                let (_, data) = entry.map_err(storage_error)?;
                postcard::from_bytes(data.value())
                    .map_err(|e| LineError::SerializationError(e.to_string()))
            }
            None => Err(LineError::NotFound(stage_id)),
        }
    }

    fn record_count(&self, stage_id: Option<StageId>) -> Result<u64, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(CYCLE_TIMES).map_err(storage_error)?;

        match stage_id {
            Some(id) => {
                let mut count = 0u64;
                for entry in table.range(stage_range(id)).map_err(storage_error)? {
                    entry.map_err(storage_error)?;
                    count += 1;
                }
                Ok(count)
            }
            None => table.len().map_err(storage_error),
        }
    }

    fn set_run_start(&mut self, start: Timestamp) -> Result<(), LineError> {
        let write_txn = self.db.begin_write().map_err(storage_error)?;
        {
            let mut table = write_txn.open_table(RUNS).map_err(storage_error)?;
            table.insert(LAST_RUN_START, start).map_err(storage_error)?;
        }
        write_txn.commit().map_err(storage_error)?;
        Ok(())
    }

    fn run_start(&self) -> Result<Option<Timestamp>, LineError> {
        let read_txn = self.db.begin_read().map_err(storage_error)?;
        let table = read_txn.open_table(RUNS).map_err(storage_error)?;
        Ok(table
            .get(LAST_RUN_START)
            .map_err(storage_error)?
            .map(|v| v.value()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn basic_round_trip() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store.append(StageId(1), 0, 100).expect("append");
        store.append(StageId(1), 150, 300).expect("append");
        store.append(StageId(1), 350, 500).expect("append");

        let totals = store.sum_and_count(StageId(1), 0).expect("totals");
        assert_eq!(totals, DurationTotals { sum_ms: 400, count: 3 });
        let gaps = store.gap_sum_and_count(StageId(1), 0).expect("gaps");
        assert_eq!(gaps, GapTotals { sum_ms: 100, count: 2 });
    }

    #[test]
    fn stages_do_not_interleave() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store.append(StageId(0), 0, 100).expect("append");
        store.append(StageId(1), 100, 250).expect("append");
        store.append(StageId(0), 100, 200).expect("append");

        let records = store.stage_records(StageId(0)).expect("records");
        let ids: Vec<_> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId(1), RecordId(3)]);

        let gaps = store.gap_sum_and_count(StageId(0), 0).expect("gaps");
        assert_eq!(gaps, GapTotals { sum_ms: 0, count: 1 });
    }

    #[test]
    fn invalid_cycle_writes_nothing() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let result = store.append(StageId(0), 500, 100);
        assert!(matches!(result, Err(LineError::InvalidCycle { .. })));
        assert_eq!(store.record_count(None).expect("count"), 0);
    }

    #[test]
    fn empty_stage_queries_not_found() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let store = RedbStore::open(&db_path).expect("open db");

        assert!(matches!(store.sum_and_count(StageId(0), 0), Err(LineError::NotFound(_))));
        assert!(matches!(store.gap_sum_and_count(StageId(0), 0), Err(LineError::NotFound(_))));
        assert!(matches!(store.first_record(StageId(0), 0), Err(LineError::NotFound(_))));
        assert!(matches!(store.last_record(StageId(0)), Err(LineError::NotFound(_))));
    }

    #[test]
    fn last_record_is_highest_id() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store.append(StageId(2), 0, 10).expect("append");
        store.append(StageId(2), 20, 30).expect("append");
        store.append(StageId(3), 40, 50).expect("append");

        let last = store.last_record(StageId(2)).expect("last");
        assert_eq!(last.id, RecordId(2));
        assert_eq!(last.exit, 30);
    }

    #[test]
    fn clear_stage_then_all() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store.append(StageId(0), 0, 10).expect("append");
        store.append(StageId(1), 10, 20).expect("append");
        store.append(StageId(1), 20, 30).expect("append");

        assert_eq!(store.clear_run(ClearScope::Stage(StageId(1))).expect("clear"), 2);
        assert_eq!(store.record_count(Some(StageId(0))).expect("count"), 1);
        assert_eq!(store.record_count(Some(StageId(1))).expect("count"), 0);

        assert_eq!(store.clear_run(ClearScope::All).expect("clear"), 1);
        assert_eq!(store.record_count(None).expect("count"), 0);
    }

    #[test]
    fn recovery_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store.register_stage(Stage::new(StageId(0), 1.5)).expect("register");
            store.append(StageId(0), 0, 1_500).expect("append");
            store.append(StageId(0), 1_600, 3_100).expect("append");
            store.set_run_start(0).expect("run start");
        }

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        let stage = store.stage(StageId(0)).expect("stage").expect("registered");
        assert!((stage.ideal_cycle_time - 1.5).abs() < f64::EPSILON);
        assert_eq!(store.run_start().expect("run start"), Some(0));
        assert_eq!(store.record_count(None).expect("count"), 2);

        // The id sequence continues where it stopped.
        let id = store.append(StageId(0), 3_200, 4_700).expect("append");
        assert_eq!(id, RecordId(3));
    }

    #[test]
    fn ids_survive_clear_and_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store.append(StageId(0), 0, 10).expect("append");
            store.append(StageId(0), 10, 20).expect("append");
            store.clear_run(ClearScope::All).expect("clear");
            store.compact().expect("compact");
        }

        let mut store = RedbStore::open(&db_path).expect("reopen db");
        let id = store.append(StageId(0), 20, 30).expect("append");
        assert_eq!(id, RecordId(3));
    }

    #[test]
    fn stages_listed_in_id_order() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        for id in [2, 0, 1] {
            store
                .register_stage(Stage::new(StageId(id), f64::from(id) + 1.0))
                .expect("register");
        }
        let ids: Vec<_> = store.stages().expect("stages").iter().map(|s| s.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
