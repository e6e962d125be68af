//! # Property-Based Tests
//!
//! Invariants of the line model checked with proptest.

use linetrack_core::{
    ClearScope, CycleStore, MemoryStore, RateConfig, RateEstimator, SimulatedClock, StageId,
    StageScheduler, StageSpec,
};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// After every sample the retained window spans at most the horizon.
    #[test]
    fn window_never_exceeds_horizon(
        deltas in vec(0i64..20_000, 1..200)
    ) {
        let mut estimator = RateEstimator::default();
        let horizon = estimator.config().horizon_ms;
        let mut t = 0i64;

        for delta in deltas {
            t += delta;
            estimator.on_sample(t, true);
            let span = estimator.span().unwrap_or(0);
            prop_assert!(span <= horizon, "span {} over horizon at {}", span, t);
        }
    }

    /// Fewer than warm-up + 1 samples never produce a rate.
    #[test]
    fn no_rate_during_warmup(
        warmup in 1usize..6,
        deltas in vec(1i64..1_000, 0..6)
    ) {
        let mut estimator = RateEstimator::new(RateConfig { horizon_ms: 60_000, warmup_samples: warmup });
        let mut t = 0i64;
        for delta in deltas {
            t += delta;
            estimator.on_sample(t, true);
            if estimator.len() <= warmup {
                prop_assert!(estimator.current_rate().is_none());
            }
        }
    }

    /// A strictly periodic stream past the warm-up reports exactly 1000 / period.
    #[test]
    fn periodic_stream_rate(period in 1i64..5_000, count in 4usize..40) {
        let mut estimator = RateEstimator::default();
        for i in 0..count {
            estimator.on_sample(i as i64 * period, true);
        }
        // The window may have evicted early samples; any retained run still has a fixed period.
        if let Some(rate) = estimator.current_rate() {
            prop_assert!((rate - 1_000.0 / period as f64).abs() < 1e-6);
        }
    }

    /// No boundary after the first ever holds more than one item.
    #[test]
    fn backpressure_single_slot(
        times in vec(1u32..5, 1..6),
        items in 1u64..12
    ) {
        let specs: Vec<_> = times
            .iter()
            .map(|&t| StageSpec::ideal(f64::from(t) * 0.25))
            .collect();
        let stages = specs.len();
        let mut store = MemoryStore::new();
        let mut scheduler = StageScheduler::new(specs, SimulatedClock::starting_at(0)).expect("scheduler");

        let mut overfilled = None;
        let summary = scheduler
            .run_observed(&mut store, items, |snapshot| {
                if snapshot.wip.iter().skip(1).any(|&w| w > 1) {
                    overfilled.get_or_insert(snapshot.now);
                }
            })
            .expect("run");

        prop_assert_eq!(overfilled, None);
        prop_assert_eq!(summary.cycles, items * stages as u64);
        for stage in 0..stages {
            prop_assert_eq!(store.record_count(Some(StageId(stage as u32))).expect("count"), items);
        }
    }

    /// Sum, count and gaps agree with a direct computation over the appended cycles.
    #[test]
    fn store_queries_match_direct_sums(
        cycles in vec((0i64..500, 0i64..500), 1..30),
        since in 0i64..10_000
    ) {
        let mut store = MemoryStore::new();
        let stage = StageId(0);
        let mut t = 0i64;
        let mut appended = Vec::new();
        for (gap, duration) in cycles {
            let enter = t + gap;
            let exit = enter + duration;
            store.append(stage, enter, exit).expect("append");
            appended.push((enter, exit));
            t = exit;
        }

        let kept: Vec<_> = appended.iter().filter(|(_, exit)| *exit >= since).collect();
        let expected_sum: i64 = kept.iter().map(|(enter, exit)| exit - enter).sum();
        let expected_gaps: i64 = kept.windows(2).map(|w| w[1].0 - w[0].1).sum();

        match store.sum_and_count(stage, since) {
            Ok(totals) => {
                prop_assert_eq!(totals.sum_ms, expected_sum);
                prop_assert_eq!(totals.count, kept.len() as u64);
            }
            Err(_) => prop_assert!(kept.is_empty()),
        }
        match store.gap_sum_and_count(stage, since) {
            Ok(gaps) => {
                prop_assert_eq!(gaps.sum_ms, expected_gaps);
                prop_assert_eq!(gaps.count, kept.len() as u64 - 1);
            }
            Err(_) => prop_assert!(kept.len() < 2),
        }
    }

    /// Ids keep increasing across clears.
    #[test]
    fn ids_strictly_increase(clear_after in vec(any::<bool>(), 1..40)) {
        let mut store = MemoryStore::new();
        let mut last = None;
        for (i, clear) in clear_after.into_iter().enumerate() {
            let id = store.append(StageId((i % 3) as u32), 0, 1).expect("append");
            if let Some(previous) = last {
                prop_assert!(id > previous);
            }
            last = Some(id);
            if clear {
                store.clear_run(ClearScope::All).expect("clear");
            }
        }
    }
}
