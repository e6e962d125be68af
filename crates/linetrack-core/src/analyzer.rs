//! # Efficiency Analyzer
//!
//! Turns a stage's cycle log into OEE-style figures:
//! cycle efficiency, time efficiency, ideal and real parts per minute,
//! run duration and wasted time.
//!
//! Every step is exposed on its own and fails with `InsufficientData` when
//! its inputs are missing. [`EfficiencyAnalyzer::analyze`] runs all steps and
//! reports an unavailable metric as `None` instead of failing; storage
//! errors still abort.

use crate::primitives::MS_PER_SECOND;
use crate::store::CycleStore;
use crate::{LineError, Stage, StageId, Timestamp};
use serde::Serialize;

// =============================================================================
// FORMULAS
// =============================================================================

/// `ideal / average * 100`.
#[must_use]
pub fn cycle_efficiency_percent(ideal_cycle_time_ms: f64, avg_cycle_time_ms: f64) -> f64 {
    ideal_cycle_time_ms / avg_cycle_time_ms * 100.0
}

/// `ideal / (ideal + gap) * 100`.
#[must_use]
pub fn time_efficiency_percent(ideal_cycle_time_ms: f64, avg_gap_ms: f64) -> f64 {
    ideal_cycle_time_ms / (ideal_cycle_time_ms + avg_gap_ms) * 100.0
}

/// Real parts per minute.
///
/// Scales the ideal cycle time in seconds, not the ideal PPM, by both
/// efficiencies. The result is reproduced as defined even though its unit
/// is not parts per minute.
#[must_use]
pub fn real_ppm(cycle_efficiency: f64, time_efficiency: f64, ideal_cycle_time_secs: f64) -> f64 {
    (cycle_efficiency / 100.0) * ideal_cycle_time_secs * (time_efficiency / 100.0) * 60.0
}

/// `(1 - real/ideal) * duration`.
#[must_use]
pub fn wasted_time_ms(real_ppm: f64, ideal_ppm: f64, duration_ms: i64) -> f64 {
    (1.0 - real_ppm / ideal_ppm) * duration_ms as f64
}

// =============================================================================
// REPORT
// =============================================================================

/// Efficiency figures for one stage over one run.
///
/// `None` marks a metric without enough data behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EfficiencyReport {
    /// Analyzed stage.
    pub stage_id: StageId,
    /// Lower bound on record exit times.
    pub since: Timestamp,
    /// Design cycle time in milliseconds.
    pub ideal_cycle_time_ms: f64,
    /// Number of cycles considered.
    pub cycle_count: u64,
    /// Mean measured cycle time in milliseconds.
    pub avg_cycle_time_ms: Option<f64>,
    /// Cycle efficiency in percent.
    pub cycle_efficiency: Option<f64>,
    /// Mean idle time between cycles in milliseconds.
    pub avg_gap_ms: Option<f64>,
    /// Time efficiency in percent.
    pub time_efficiency: Option<f64>,
    /// Ideal parts per minute.
    pub ideal_ppm: f64,
    /// Real parts per minute.
    pub real_ppm: Option<f64>,
    /// Real over ideal PPM in percent.
    pub ratio_percent: Option<f64>,
    /// Run duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Time lost against the ideal rate, in milliseconds.
    pub wasted_time_ms: Option<f64>,
    /// Time lost against the ideal rate, in percent.
    pub wasted_percent: Option<f64>,
}

// =============================================================================
// ANALYZER
// =============================================================================

/// Read-only view over a cycle store that computes efficiency figures.
#[derive(Debug)]
pub struct EfficiencyAnalyzer<'a, S: CycleStore> {
    store: &'a S,
}

impl<'a, S: CycleStore> EfficiencyAnalyzer<'a, S> {
    /// Analyzer over `store`.
    #[must_use]
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Mean cycle time in ms and the cycle count.
    pub fn average_cycle_time(
        &self,
        stage_id: StageId,
        since: Timestamp,
    ) -> Result<(f64, u64), LineError> {
        let totals = insufficient(self.store.sum_and_count(stage_id, since), "no cycles")?;
        let avg = totals
            .average()
            .ok_or_else(|| LineError::InsufficientData("no cycles".into()))?;
        Ok((avg, totals.count))
    }

    /// Cycle efficiency in percent.
    pub fn cycle_efficiency(&self, stage: &Stage, since: Timestamp) -> Result<f64, LineError> {
        let (avg, _) = self.average_cycle_time(stage.id, since)?;
        Ok(cycle_efficiency_percent(stage.ideal_cycle_time_ms(), avg))
    }

    /// Mean gap between consecutive cycles in ms.
    pub fn average_gap(&self, stage_id: StageId, since: Timestamp) -> Result<f64, LineError> {
        let gaps = insufficient(
            self.store.gap_sum_and_count(stage_id, since),
            "fewer than two cycles",
        )?;
        gaps.average()
            .ok_or_else(|| LineError::InsufficientData("fewer than two cycles".into()))
    }

    /// Time efficiency in percent.
    pub fn time_efficiency(&self, stage: &Stage, since: Timestamp) -> Result<f64, LineError> {
        let gap = self.average_gap(stage.id, since)?;
        Ok(time_efficiency_percent(stage.ideal_cycle_time_ms(), gap))
    }

    /// Real parts per minute.
    pub fn real_ppm(&self, stage: &Stage, since: Timestamp) -> Result<f64, LineError> {
        let ce = self.cycle_efficiency(stage, since)?;
        let te = self.time_efficiency(stage, since)?;
        Ok(real_ppm(ce, te, stage.ideal_cycle_time))
    }

    /// Last exit of the stage minus the enter of its first record since `since`.
    pub fn run_duration(&self, stage_id: StageId, since: Timestamp) -> Result<i64, LineError> {
        let first = insufficient(self.store.first_record(stage_id, since), "no first record")?;
        let last = insufficient(self.store.last_record(stage_id), "no last record")?;
        Ok(last.exit - first.enter)
    }

    /// Time lost against the ideal rate, in ms.
    pub fn wasted_time(&self, stage: &Stage, since: Timestamp) -> Result<f64, LineError> {
        let real = self.real_ppm(stage, since)?;
        let duration = self.run_duration(stage.id, since)?;
        Ok(wasted_time_ms(real, stage.ideal_ppm(), duration))
    }

    /// Full report for a registered stage.
    pub fn analyze(&self, stage_id: StageId, since: Timestamp) -> Result<EfficiencyReport, LineError> {
        let stage = self
            .store
            .stage(stage_id)?
            .ok_or(LineError::UnknownStage(stage_id))?;
        self.analyze_stage(&stage, since)
    }

    /// Full report for `stage`, which need not be registered.
    pub fn analyze_stage(&self, stage: &Stage, since: Timestamp) -> Result<EfficiencyReport, LineError> {
        let ideal_ms = stage.ideal_cycle_time_ms();
        let ideal_ppm = stage.ideal_ppm();

        let cycle = available(self.average_cycle_time(stage.id, since), "avg_cycle_time")?;
        let avg_gap = available(self.average_gap(stage.id, since), "avg_gap")?;
        let duration = available(self.run_duration(stage.id, since), "duration")?;

        let avg_cycle_time_ms = cycle.map(|(avg, _)| avg);
        let cycle_count = cycle.map(|(_, count)| count).unwrap_or(0);
        let cycle_efficiency = avg_cycle_time_ms.map(|avg| cycle_efficiency_percent(ideal_ms, avg));
        let time_efficiency = avg_gap.map(|gap| time_efficiency_percent(ideal_ms, gap));

        let real = cycle_efficiency
            .zip(time_efficiency)
            .map(|(ce, te)| real_ppm(ce, te, stage.ideal_cycle_time));
        let ratio_percent = real.map(|r| r / ideal_ppm * 100.0);
        let wasted = real
            .zip(duration)
            .map(|(r, d)| wasted_time_ms(r, ideal_ppm, d));
        let wasted_percent = real.map(|r| (1.0 - r / ideal_ppm) * 100.0);

        tracing::debug!(
            stage = %stage.id,
            since,
            cycle_count,
            ?cycle_efficiency,
            ?time_efficiency,
            "stage analyzed"
        );

        Ok(EfficiencyReport {
            stage_id: stage.id,
            since,
            ideal_cycle_time_ms: ideal_ms,
            cycle_count,
            avg_cycle_time_ms,
            cycle_efficiency,
            avg_gap_ms: avg_gap,
            time_efficiency,
            ideal_ppm,
            real_ppm: real,
            ratio_percent,
            duration_ms: duration,
            wasted_time_ms: wasted,
            wasted_percent,
        })
    }

    /// Reports for every registered stage, in id order.
    pub fn analyze_all(&self, since: Timestamp) -> Result<Vec<EfficiencyReport>, LineError> {
        self.store
            .stages()?
            .iter()
            .map(|stage| self.analyze_stage(stage, since))
            .collect()
    }
}

/// Map `NotFound` from a store query to `InsufficientData`.
fn insufficient<T>(result: Result<T, LineError>, what: &str) -> Result<T, LineError> {
    result.map_err(|e| match e {
        LineError::NotFound(stage) => {
            LineError::InsufficientData(format!("stage {stage}: {what}"))
        }
        other => other,
    })
}

/// Turn insufficient data into `None`; keep every other error.
fn available<T>(result: Result<T, LineError>, metric: &str) -> Result<Option<T>, LineError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_insufficient_data() => {
            tracing::debug!(metric, reason = %e, "metric unavailable");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Convert a millisecond figure to seconds.
#[must_use]
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / MS_PER_SECOND
}

// =============================================================================
// TESTS
// =============================================================================
