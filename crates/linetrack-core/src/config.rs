//! # Line Configuration
//!
//! Static run configuration: the stages of the line, the number of items to
//! push through it, and the live-monitoring parameters.
//!
//! These types carry serde derives so the app can load them from TOML and
//! echo them as JSON. Loading lives in the app; validation lives here.

use crate::primitives::{
    DEFAULT_IDEAL_CYCLE_TIME, DEFAULT_ITEM_COUNT, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_STAGE_COUNT,
    MAX_STAGES, MS_PER_SECOND,
};
use crate::rate::RateConfig;
use crate::{LineError, Stage, StageId};
use serde::{Deserialize, Serialize};

// =============================================================================
// STAGE SPEC
// =============================================================================

/// Configuration of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Design cycle time in seconds.
    pub ideal_cycle_time: f64,
    /// Factor applied to the ideal time to get the simulated processing time.
    ///
    /// Values above 1.0 model a slow or varying machine.
    #[serde(default = "default_multiplier")]
    pub processing_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl StageSpec {
    /// Stage running exactly at its design speed.
    #[must_use]
    pub const fn ideal(ideal_cycle_time: f64) -> Self {
        Self {
            ideal_cycle_time,
            processing_multiplier: 1.0,
        }
    }

    /// Simulated processing time in whole milliseconds.
    #[must_use]
    pub fn real_cycle_time_ms(&self) -> i64 {
        (self.ideal_cycle_time * MS_PER_SECOND * self.processing_multiplier).round() as i64
    }
}

// =============================================================================
// MONITOR CONFIG
// =============================================================================

/// Live-monitoring parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sliding-window parameters shared by entry and exit estimators.
    #[serde(flatten)]
    pub rate: RateConfig,
    /// Target input rate in items per second; input % is measured against it.
    pub optimal_rate: f64,
    /// Reopen attempts after the event source disconnects.
    pub reconnect_attempts: u32,
    /// Pause before each reopen attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            rate: RateConfig::default(),
            optimal_rate: 1.0,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: 0,
        }
    }
}

impl MonitorConfig {
    /// Reject invalid window parameters and a non-positive optimal rate.
    pub fn validate(&self) -> Result<(), LineError> {
        self.rate.validate()?;
        if !(self.optimal_rate.is_finite() && self.optimal_rate > 0.0) {
            return Err(LineError::InvalidConfig(format!(
                "optimal rate must be positive, got {}",
                self.optimal_rate
            )));
        }
        Ok(())
    }
}

// =============================================================================
// LINE CONFIG
// =============================================================================

/// Complete configuration of a line and its runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineConfig {
    /// Items pre-loaded at the first boundary.
    pub items: u64,
    /// Stages in flow order.
    pub stages: Vec<StageSpec>,
    /// Live-monitoring parameters.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            items: DEFAULT_ITEM_COUNT,
            stages: (0..DEFAULT_STAGE_COUNT)
                .map(|_| StageSpec::ideal(DEFAULT_IDEAL_CYCLE_TIME))
                .collect(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl LineConfig {
    /// Check every constraint a run depends on.
    pub fn validate(&self) -> Result<(), LineError> {
        if self.stages.is_empty() {
            return Err(LineError::InvalidConfig("line has no stages".into()));
        }
        if self.stages.len() > MAX_STAGES {
            return Err(LineError::InvalidConfig(format!(
                "line has {} stages, at most {} supported",
                self.stages.len(),
                MAX_STAGES
            )));
        }
        if self.items == 0 {
            return Err(LineError::InvalidConfig("item count must be positive".into()));
        }
        for (index, spec) in self.stages.iter().enumerate() {
            if !(spec.ideal_cycle_time.is_finite() && spec.ideal_cycle_time > 0.0) {
                return Err(LineError::InvalidConfig(format!(
                    "stage {index}: ideal cycle time must be positive, got {}",
                    spec.ideal_cycle_time
                )));
            }
            if !(spec.processing_multiplier.is_finite() && spec.processing_multiplier > 0.0) {
                return Err(LineError::InvalidConfig(format!(
                    "stage {index}: processing multiplier must be positive, got {}",
                    spec.processing_multiplier
                )));
            }
        }
        self.monitor.validate()
    }

    /// Stage definitions with ids assigned in flow order.
    #[must_use]
    pub fn stage_definitions(&self) -> Vec<Stage> {
        self.stages
            .iter()
            .enumerate()
            .map(|(index, spec)| Stage::new(StageId(index as u32), spec.ideal_cycle_time))
            .collect()
    }

    /// Configuration of one stage.
    pub fn stage_spec(&self, id: StageId) -> Result<&StageSpec, LineError> {
        self.stages.get(id.index()).ok_or(LineError::UnknownStage(id))
    }
}
