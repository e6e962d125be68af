//! # Line Primitives
//!
//! Default constants for the linetrack CORE.
//!
//! Every value here is a default: the rate estimator, the scheduler and the
//! monitor take their effective values from configuration.

/// Lookback of the rate estimator's sliding window, in milliseconds.
///
/// After each eviction pass `max(window) - min(window) <= RATE_WINDOW_HORIZON_MS`.
pub const RATE_WINDOW_HORIZON_MS: i64 = 60_000;

/// Number of retained samples discarded as the cold-start transient.
///
/// The first triggers after a sensor connects arrive in a burst.
pub const DEFAULT_WARMUP_SAMPLES: usize = 3;

/// Items pushed through the line when no item count is configured.
pub const DEFAULT_ITEM_COUNT: u64 = 5;

/// Stages on the default line.
pub const DEFAULT_STAGE_COUNT: u32 = 3;

/// Ideal cycle time of a default stage, in seconds.
pub const DEFAULT_IDEAL_CYCLE_TIME: f64 = 1.0;

/// Upper bound on stages per line.
///
/// A line is a short sequential conveyor; this bound keeps the per-step
/// scheduler scan small.
pub const MAX_STAGES: usize = 64;

/// Reconnect attempts after the event source drops.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Milliseconds per second.
pub const MS_PER_SECOND: f64 = 1000.0;
