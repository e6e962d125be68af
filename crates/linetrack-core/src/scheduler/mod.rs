//! # Stage Scheduler
//!
//! Simulates an N-stage conveyor with a single-occupancy handoff slot
//! between adjacent stages.
//!
//! Each stage is an explicit state machine (`Idle`, `Processing`, `Blocked`,
//! `Done`) stepped round-robin by one loop. The work-in-progress counters
//! live in a [`PipelineState`] owned by the loop, so the "check downstream,
//! then move the item" handoff is a single method call and no other stage
//! can observe a half-finished move.
//!
//! ## Handoff rule
//!
//! `wip[i]` counts the items at stage `i`, waiting or in process. A
//! non-terminal stage may hand an item on only while `wip[i+1] == 0`, so
//! every boundary after the first holds at most one item. The terminal
//! stage absorbs output without limit.
//!
//! ## Completion
//!
//! An idle stage with nothing left at or upstream of its own boundary is
//! `Done`. The run ends once every stage is `Done`; the last stage therefore
//! finishes the final item before the run returns.

mod clock;

pub use clock::{Clock, SimulatedClock, WallClock, epoch_millis};

use crate::config::{LineConfig, StageSpec};
use crate::store::CycleStore;
use crate::{LineError, StageId, Timestamp};
use serde::Serialize;

// =============================================================================
// STAGE STATE
// =============================================================================

/// Per-stage state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StageState {
    /// Waiting for an item.
    Idle,
    /// Working on an item picked up at `enter`; done at `ready_at`.
    Processing {
        /// Pickup time.
        enter: Timestamp,
        /// Time the processing delay elapses.
        ready_at: Timestamp,
    },
    /// Finished the item picked up at `enter`; waiting for a free downstream slot.
    Blocked {
        /// Pickup time.
        enter: Timestamp,
    },
    /// No work can reach this stage any more.
    Done,
}

// =============================================================================
// PIPELINE STATE
// =============================================================================

/// Work-in-progress counters, one per stage input boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    wip: Vec<u64>,
}

impl PipelineState {
    /// `items` pre-loaded at boundary 0; every other boundary empty.
    #[must_use]
    pub fn new(stage_count: usize, items: u64) -> Self {
        let mut wip = vec![0; stage_count];
        if let Some(first) = wip.first_mut() {
            *first = items;
        }
        Self { wip }
    }

    /// Items at boundary `index`.
    #[must_use]
    pub fn wip(&self, index: usize) -> u64 {
        self.wip.get(index).copied().unwrap_or(0)
    }

    /// All counters in flow order.
    #[must_use]
    pub fn boundaries(&self) -> &[u64] {
        &self.wip
    }

    /// Items still at or upstream of `stage`.
    fn work_reaching(&self, stage: usize) -> u64 {
        self.wip.iter().take(stage + 1).sum()
    }

    fn is_terminal(&self, stage: usize) -> bool {
        stage + 1 == self.wip.len()
    }

    /// Move one item from `stage` downstream if the slot is free.
    ///
    /// Check, decrement and increment happen in one call; returns whether the
    /// item moved.
    fn try_handoff(&mut self, stage: usize) -> bool {
        let terminal = self.is_terminal(stage);
        if !terminal && self.wip(stage + 1) > 0 {
            return false;
        }
        self.wip[stage] = self.wip[stage].saturating_sub(1);
        if !terminal {
            self.wip[stage + 1] += 1;
        }
        true
    }
}

/// What an observer sees after each scheduling pass.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSnapshot<'a> {
    /// Clock reading for the pass.
    pub now: Timestamp,
    /// WIP per boundary.
    pub wip: &'a [u64],
    /// State per stage.
    pub states: &'a [StageState],
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Clock reading when the run started.
    pub started_at: Timestamp,
    /// Clock reading when the last stage finished.
    pub finished_at: Timestamp,
    /// Cycles recorded across all stages.
    pub cycles: u64,
}

// =============================================================================
// STAGE SCHEDULER
// =============================================================================

/// Runs items through a line and records every completed cycle.
#[derive(Debug)]
pub struct StageScheduler<C: Clock> {
    specs: Vec<StageSpec>,
    clock: C,
}

impl<C: Clock> StageScheduler<C> {
    /// Scheduler for the given stages, in flow order.
    pub fn new(specs: Vec<StageSpec>, clock: C) -> Result<Self, LineError> {
        if specs.is_empty() {
            return Err(LineError::InvalidConfig("line has no stages".into()));
        }
        Ok(Self { specs, clock })
    }

    /// Scheduler for a validated line configuration.
    pub fn from_config(config: &LineConfig, clock: C) -> Result<Self, LineError> {
        config.validate()?;
        Self::new(config.stages.clone(), clock)
    }

    /// Current clock reading.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `items` through the line.
    pub fn run<S: CycleStore>(&mut self, store: &mut S, items: u64) -> Result<RunSummary, LineError> {
        self.run_observed(store, items, |_| {})
    }

    /// Run `items` through the line, calling `observe` after every pass.
    pub fn run_observed<S, F>(
        &mut self,
        store: &mut S,
        items: u64,
        mut observe: F,
    ) -> Result<RunSummary, LineError>
    where
        S: CycleStore,
        F: FnMut(&PipelineSnapshot<'_>),
    {
        let started_at = self.clock.now();
        let mut pipeline = PipelineState::new(self.specs.len(), items);
        let mut states = vec![StageState::Idle; self.specs.len()];
        let mut cycles = 0u64;

        tracing::info!(stages = self.specs.len(), items, started_at, "scheduler run started");

        loop {
            let now = self.clock.now();
            let mut progressed = false;

            for index in 0..self.specs.len() {
                let step = self.step_stage(index, now, &mut states, &mut pipeline, store)?;
                progressed |= step.progressed;
                cycles += u64::from(step.recorded);
            }

            observe(&PipelineSnapshot {
                now,
                wip: pipeline.boundaries(),
                states: &states,
            });

            if states.iter().all(|s| *s == StageState::Done) {
                break;
            }

            if !progressed {
                let next = states
                    .iter()
                    .filter_map(|s| match s {
                        StageState::Processing { ready_at, .. } if *ready_at > now => {
                            Some(*ready_at)
                        }
                        _ => None,
                    })
                    .min();
                match next {
                    Some(t) => self.clock.advance_to(t),
                    None => {
                        tracing::warn!(now, wip = ?pipeline.boundaries(), "scheduler stalled");
                        return Err(LineError::SchedulerStalled(now));
                    }
                }
            }
        }

        let finished_at = self.clock.now();
        tracing::info!(cycles, finished_at, "scheduler run finished");
        Ok(RunSummary {
            started_at,
            finished_at,
            cycles,
        })
    }

    fn step_stage<S: CycleStore>(
        &self,
        index: usize,
        now: Timestamp,
        states: &mut [StageState],
        pipeline: &mut PipelineState,
        store: &mut S,
    ) -> Result<Step, LineError> {
        let stage_id = StageId(index as u32);

        match states[index] {
            StageState::Idle => {
                if pipeline.wip(index) > 0 {
                    let ready_at = now + self.specs[index].real_cycle_time_ms();
                    states[index] = StageState::Processing {
                        enter: now,
                        ready_at,
                    };
                    Ok(Step::moved())
                } else if pipeline.work_reaching(index) == 0 {
                    tracing::debug!(stage = %stage_id, now, "stage done");
                    states[index] = StageState::Done;
                    Ok(Step::moved())
                } else {
                    Ok(Step::idle())
                }
            }
            StageState::Processing { enter, ready_at } => {
                if now < ready_at {
                    return Ok(Step::idle());
                }
                if pipeline.try_handoff(index) {
                    store.append(stage_id, enter, now)?;
                    states[index] = StageState::Idle;
                    Ok(Step::handed_off())
                } else {
                    tracing::debug!(stage = %stage_id, now, "blocked on downstream slot");
                    states[index] = StageState::Blocked { enter };
                    Ok(Step::moved())
                }
            }
            StageState::Blocked { enter } => {
                if pipeline.try_handoff(index) {
                    store.append(stage_id, enter, now)?;
                    states[index] = StageState::Idle;
                    Ok(Step::handed_off())
                } else {
                    Ok(Step::idle())
                }
            }
            StageState::Done => Ok(Step::idle()),
        }
    }
}

/// Result of stepping one stage once.
#[derive(Debug, Clone, Copy)]
struct Step {
    progressed: bool,
    recorded: bool,
}

impl Step {
    const fn idle() -> Self {
        Self {
            progressed: false,
            recorded: false,
        }
    }

    const fn moved() -> Self {
        Self {
            progressed: true,
            recorded: false,
        }
    }

    const fn handed_off() -> Self {
        Self {
            progressed: true,
            recorded: true,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
