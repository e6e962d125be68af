//! # Machine Monitor
//!
//! Live monitoring of one stage from its entry and exit sensors.
//!
//! Each sensor reports boolean samples; a `true` sample is an item passing.
//! The monitor feeds entry and exit triggers into separate
//! [`RateEstimator`]s and pairs them first-in first-out into completed
//! cycles, which it appends to the cycle store. This is the sensor-driven
//! counterpart of the simulated [`StageScheduler`](crate::StageScheduler).
//!
//! Malformed samples (no timestamp, or a non-boolean value) are dropped and
//! counted, never surfaced as errors.

use crate::config::MonitorConfig;
use crate::rate::RateEstimator;
use crate::store::CycleStore;
use crate::{LineError, RecordId, StageId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

// =============================================================================
// SENSOR EVENTS
// =============================================================================

/// Which sensor of a stage produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorChannel {
    /// Item arriving at the stage.
    Enter,
    /// Item leaving the stage.
    Exit,
}

/// Raw sensor reading as delivered by the event source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    /// Boolean reading; the only well-formed kind.
    Bool(bool),
    /// Numeric reading.
    Number(f64),
    /// Text reading.
    Text(String),
}

/// One sample from a stage sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Source sensor.
    pub channel: SensorChannel,
    /// Reading, if the source sent one.
    #[serde(default)]
    pub value: Option<SensorValue>,
    /// Source timestamp in ms since the epoch.
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

impl SensorEvent {
    /// Well-formed boolean sample.
    #[must_use]
    pub fn new(channel: SensorChannel, value: bool, timestamp: Timestamp) -> Self {
        Self {
            channel,
            value: Some(SensorValue::Bool(value)),
            timestamp: Some(timestamp),
        }
    }

    /// `(timestamp, triggered)` when the sample is well-formed.
    #[must_use]
    pub fn reading(&self) -> Option<(Timestamp, bool)> {
        match (&self.value, self.timestamp) {
            (Some(SensorValue::Bool(value)), Some(timestamp)) => Some((timestamp, *value)),
            _ => None,
        }
    }
}

// =============================================================================
// MONITOR UPDATE
// =============================================================================

/// Rates after a trigger was processed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MonitorUpdate {
    /// Monitored stage.
    pub stage_id: StageId,
    /// Sensor that triggered.
    pub channel: SensorChannel,
    /// Trigger time.
    pub timestamp: Timestamp,
    /// Entry rate in items per second.
    pub input_rate: Option<f64>,
    /// Exit rate in items per second.
    pub output_rate: Option<f64>,
    /// Entry rate as a percentage of the optimal rate.
    pub input_percent: Option<f64>,
    /// Cycle completed by this trigger, if any.
    pub recorded: Option<RecordId>,
}

// =============================================================================
// MACHINE MONITOR
// =============================================================================

/// Entry/exit rate tracking and cycle pairing for one stage.
#[derive(Debug, Clone)]
pub struct MachineMonitor {
    stage_id: StageId,
    optimal_rate: f64,
    entry: RateEstimator,
    exit: RateEstimator,
    /// Entry times not yet matched by an exit, oldest first.
    pending: VecDeque<Timestamp>,
    dropped: u64,
}

impl MachineMonitor {
    /// Monitor for `stage_id`.
    #[must_use]
    pub fn new(stage_id: StageId, config: &MonitorConfig) -> Self {
        Self {
            stage_id,
            optimal_rate: config.optimal_rate,
            entry: RateEstimator::new(config.rate),
            exit: RateEstimator::new(config.rate),
            pending: VecDeque::new(),
            dropped: 0,
        }
    }

    /// Monitored stage.
    #[must_use]
    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    /// Process one sample.
    ///
    /// Returns an update for every trigger, `None` for untriggered or
    /// malformed samples. Only store failures are errors.
    pub fn on_event<S: CycleStore>(
        &mut self,
        event: &SensorEvent,
        store: &mut S,
    ) -> Result<Option<MonitorUpdate>, LineError> {
        let Some((timestamp, triggered)) = event.reading() else {
            self.dropped += 1;
            tracing::debug!(stage = %self.stage_id, ?event, "dropping malformed sensor event");
            return Ok(None);
        };

        let recorded = match event.channel {
            SensorChannel::Enter => {
                self.entry.on_sample(timestamp, triggered);
                if triggered {
                    self.pending.push_back(timestamp);
                }
                None
            }
            SensorChannel::Exit => {
                self.exit.on_sample(timestamp, triggered);
                if triggered {
                    self.complete_cycle(timestamp, store)?
                } else {
                    None
                }
            }
        };

        if !triggered {
            return Ok(None);
        }

        let update = MonitorUpdate {
            stage_id: self.stage_id,
            channel: event.channel,
            timestamp,
            input_rate: self.input_rate(),
            output_rate: self.output_rate(),
            input_percent: self.input_percent(),
            recorded,
        };
        Ok(Some(update))
    }

    fn complete_cycle<S: CycleStore>(
        &mut self,
        exit: Timestamp,
        store: &mut S,
    ) -> Result<Option<RecordId>, LineError> {
        let Some(enter) = self.pending.pop_front() else {
            tracing::warn!(stage = %self.stage_id, exit, "exit trigger without a pending entry");
            return Ok(None);
        };

        match store.append(self.stage_id, enter, exit) {
            Ok(id) => Ok(Some(id)),
            Err(LineError::InvalidCycle { enter, exit }) => {
                self.dropped += 1;
                tracing::warn!(stage = %self.stage_id, enter, exit, "sensor pair out of order");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Report a lost event source.
    ///
    /// The rate windows and pending entries are kept, so estimation resumes
    /// where it stopped once samples flow again.
    pub fn on_disconnect(&self, reason: &str) -> LineError {
        tracing::warn!(
            stage = %self.stage_id,
            reason,
            retained = self.entry.len() + self.exit.len(),
            "event source disconnected"
        );
        LineError::ConnectionError(reason.to_string())
    }

    /// Entry rate in items per second.
    #[must_use]
    pub fn input_rate(&self) -> Option<f64> {
        self.entry.current_rate()
    }

    /// Exit rate in items per second.
    #[must_use]
    pub fn output_rate(&self) -> Option<f64> {
        self.exit.current_rate()
    }

    /// Entry rate as a percentage of the optimal rate.
    #[must_use]
    pub fn input_percent(&self) -> Option<f64> {
        self.input_rate()
            .map(|rate| rate / self.optimal_rate * 100.0)
    }

    /// Entries waiting for their exit.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Samples dropped as malformed or unpairable.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    /// Entry estimator.
    #[must_use]
    pub fn entry(&self) -> &RateEstimator {
        &self.entry
    }

    /// Exit estimator.
    #[must_use]
    pub fn exit(&self) -> &RateEstimator {
        &self.exit
    }
}
