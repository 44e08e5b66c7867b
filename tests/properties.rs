//! Property tests for the classifier, the composer and the scorer.
//!
//! Uses proptest to verify:
//! 1. Classifier determinism: same pair, same shape; valid pairs never fail
//! 2. Composer completeness: volume in equals volume out, every bar lands in one bucket
//! 3. Composer idempotence: composing the same input twice gives the same output
//! 4. Confidence bounds: every score stays within [0.40, 0.95]

use chrono::TimeZone;
use chrono_tz::America::New_York;
use proptest::prelude::*;
use stratscan::prelude::*;

const HOUR_MS: i64 = 3_600_000;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_bar() -> impl Strategy<Value = Bar> {
    (10.0..500.0_f64, 0.0..20.0_f64, 0.0..=1.0_f64, 0.0..=1.0_f64, 0.0..1e6_f64).prop_map(
        |(low, spread, fo, fc, volume)| {
            let high = low + spread;
            Bar::new(low + fo * spread, high, low, low + fc * spread, volume.round())
        },
    )
}

/// Consecutive hourly bars starting on a local midnight; the range straddles a DST change
fn arb_hourly_series() -> impl Strategy<Value = Vec<Bar>> {
    (0u32..6, prop::collection::vec(arb_bar(), 1..120)).prop_map(|(day_offset, bars)| {
        let origin = New_York
            .with_ymd_and_hms(2024, 3, 7 + day_offset, 0, 0, 0)
            .unwrap()
            .timestamp_millis();
        bars.into_iter()
            .enumerate()
            .map(|(i, bar)| {
                let start = origin + i as i64 * HOUR_MS;
                bar.spanning(start, start + HOUR_MS)
            })
            .collect()
    })
}

fn arb_pattern() -> impl Strategy<Value = PatternType> {
    prop::sample::select(PatternType::ALL.to_vec())
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    prop::sample::select(vec![Shape::Inside, Shape::Up, Shape::Down, Shape::Outside])
}

// ── 1. Classifier ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn classify_is_deterministic(curr in arb_bar(), prev in arb_bar()) {
        let first = classify(&curr, &prev);
        let second = classify(&curr, &prev);
        prop_assert!(first.is_ok());
        prop_assert_eq!(first.unwrap(), second.unwrap());
    }

    /// A bar never breaks its own extremes
    #[test]
    fn classify_against_self_is_inside(bar in arb_bar()) {
        prop_assert_eq!(classify(&bar, &bar).unwrap(), Shape::Inside);
    }

    #[test]
    fn classify_series_pairs_every_valid_bar(bars in arb_hourly_series()) {
        let classified = classify_series(&bars);
        prop_assert_eq!(classified.len(), bars.len() - 1);
        for pair in classified.windows(2) {
            prop_assert!(pair[1].follows(&pair[0]));
        }
    }
}

// ── 2 & 3. Composer ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn compose_conserves_volume(bars in arb_hourly_series()) {
        let clock = SessionClock::new(New_York);
        let input: f64 = bars.iter().map(|b| b.volume).sum();

        for rule in [BucketRule::FOUR_HOUR, BucketRule::TWELVE_HOUR] {
            let composed = compose(&bars, rule, &clock);
            let output: f64 = composed.iter().map(|b| b.volume).sum();
            prop_assert!((input - output).abs() <= 1e-6 * input.max(1.0));
            prop_assert!(composed.len() <= bars.len());
            prop_assert!(composed.windows(2).all(|w| w[0].end_millis < w[1].end_millis));
            for bucket in &composed {
                prop_assert!(bucket.validate().is_ok());
            }
        }
    }

    #[test]
    fn compose_is_idempotent_under_rerun(bars in arb_hourly_series()) {
        let clock = SessionClock::new(New_York);
        let first = compose(&bars, BucketRule::FOUR_HOUR, &clock);
        let second = compose(&bars, BucketRule::FOUR_HOUR, &clock);
        prop_assert_eq!(first, second);
    }

    /// Every composed bucket covers exactly the input bars whose start falls inside it
    #[test]
    fn compose_assigns_each_bar_once(bars in arb_hourly_series()) {
        let clock = SessionClock::new(New_York);
        let composed = compose(&bars, BucketRule::FOUR_HOUR, &clock);
        for bar in &bars {
            let owners = composed
                .iter()
                .filter(|b| b.start_millis <= bar.start_millis && bar.start_millis < b.end_millis)
                .count();
            prop_assert_eq!(owners, 1);
        }
    }
}

// ── 4. Confidence bounds ─────────────────────────────────────────────

proptest! {
    #[test]
    fn score_stays_in_bounds(
        pattern in arb_pattern(),
        trailing in prop::collection::vec(arb_bar(), 0..40),
        supporting in prop::collection::vec((arb_bar(), arb_shape()), 0..4),
        hour in 0u32..24,
    ) {
        let event = PatternEvent {
            pattern,
            stage: Stage::Confirmed,
            direction: None,
            anchor_millis: 0,
            entry: 100.0,
            levels: None,
            supporting: supporting
                .into_iter()
                .map(|(bar, shape)| ClassifiedBar { bar, shape, prev_start_millis: 0 })
                .collect(),
        };
        let confidence = score(pattern, &event, &trailing, hour).get();
        prop_assert!((Confidence::MIN..=Confidence::MAX).contains(&confidence));
    }
}
