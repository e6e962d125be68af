//! # linetrack-core
//!
//! The deterministic production-line model for linetrack - THE LOGIC.
//!
//! This crate measures how close a sequential production line runs to its
//! design speed. It records every completed stage cycle in an append-only
//! log and derives OEE-style figures from that log.
//!
//! ## Components
//!
//! - `rate`: sliding-window items/second estimation from sensor triggers
//! - `recorder` / `store` / `storage`: the cycle log (in-memory or redb)
//! - `scheduler`: simulated N-stage conveyor with single-slot handoffs
//! - `analyzer` / `report`: efficiency figures and their text rendering
//! - `monitor`: live entry/exit sensor monitoring of a stage
//!
//! ## Architectural Constraints
//!
//! - Synchronous and deterministic given a deterministic clock
//! - NO async, NO network dependencies; event transport belongs to the app
//! - Every fallible operation returns `Result<_, LineError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod analyzer;
pub mod config;
pub mod monitor;
pub mod primitives;
pub mod rate;
pub mod recorder;
pub mod report;
pub mod scheduler;
pub mod storage;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ClearScope, CycleRecord, DurationTotals, GapTotals, LineError, RecordId, Stage, StageId,
    Timestamp,
};

// =============================================================================
// RE-EXPORTS: Line Model
// =============================================================================

pub use analyzer::{EfficiencyAnalyzer, EfficiencyReport};
pub use config::{LineConfig, MonitorConfig, StageSpec};
pub use monitor::{MachineMonitor, MonitorUpdate, SensorChannel, SensorEvent, SensorValue};
pub use rate::{RateConfig, RateEstimator};
pub use recorder::{CycleTimeRecorder, StorageBackend};
pub use report::{format_duration, render_all, render_text};
pub use scheduler::{
    Clock, PipelineSnapshot, PipelineState, RunSummary, SimulatedClock, StageScheduler,
    StageState, WallClock, epoch_millis,
};
pub use storage::RedbStore;
pub use store::{CycleStore, MemoryStore};
