//! 2-2 reversal detector (4-hour buckets)
//!
//! Per local calendar day, the 04:00 bucket is `2U`/`2D` and the 08:00 bucket reverses it.
//! The 08:00 bucket must open inside the 04:00 range, which gates out gaps.

use crate::{
    clock::SessionClock,
    shape::ClassifiedBar,
    PatternDetector, PatternEvent, PatternType, Result, Stage, StratError,
};

use super::helpers::{index_by_local_hour, reversal_direction, reversal_levels};

/// 2-2 detector
#[derive(Debug, Clone)]
pub struct Reversal22Detector {
    pub first_hour: u32,
    pub second_hour: u32,
}

impl Default for Reversal22Detector {
    fn default() -> Self {
        Self { first_hour: 4, second_hour: 8 }
    }
}

impl PatternDetector for Reversal22Detector {
    fn pattern(&self) -> PatternType {
        PatternType::Reversal22
    }

    fn min_bars(&self) -> usize {
        2
    }

    fn validate_config(&self) -> Result<()> {
        if self.second_hour >= 24 || self.first_hour >= self.second_hour {
            return Err(StratError::InvalidConfig(format!(
                "2-2 hours must satisfy first < second < 24, got {} and {}",
                self.first_hour, self.second_hour
            )));
        }
        Ok(())
    }

    fn detect(&self, bars: &[ClassifiedBar], clock: &SessionClock) -> Vec<PatternEvent> {
        let mut events = Vec::new();

        for hours in index_by_local_hour(bars, clock).into_values() {
            let (Some(&i1), Some(&i2)) = (hours.get(&self.first_hour), hours.get(&self.second_hour))
            else {
                continue;
            };
            let (first, second) = (&bars[i1], &bars[i2]);
            if !second.follows(first) {
                continue;
            }

            let opens_inside =
                second.bar.open >= first.bar.low && second.bar.open <= first.bar.high;
            if !opens_inside {
                continue;
            }

            let Some(direction) = reversal_direction(first.shape, second.shape) else {
                continue;
            };

            let levels = reversal_levels(direction, second.bar.close, first);
            events.push(PatternEvent {
                pattern: PatternType::Reversal22,
                stage: Stage::Confirmed,
                direction: Some(direction),
                anchor_millis: second.bar.end_millis,
                entry: levels.entry,
                levels: Some(levels),
                supporting: vec![*first, *second],
            });
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{shape::{classify_series, Shape}, Bar, Direction};
    use chrono::TimeZone;
    use chrono_tz::America::New_York;

    const FOUR_HOURS_MS: i64 = 4 * 3_600_000;

    fn bucket(hour: u32, o: f64, h: f64, l: f64, c: f64) -> Bar {
        let start = New_York.with_ymd_and_hms(2024, 3, 5, hour, 0, 0).unwrap().timestamp_millis();
        Bar::new(o, h, l, c, 1000.0).spanning(start, start + FOUR_HOURS_MS)
    }

    fn day(second: Bar) -> Vec<Bar> {
        vec![
            bucket(0, 100.0, 105.0, 95.0, 100.0),
            bucket(4, 99.0, 104.0, 93.0, 96.0), // 2D
            second,
        ]
    }

    #[test]
    fn test_bullish_22() {
        let clock = SessionClock::new(New_York);
        let classified = classify_series(&day(bucket(8, 97.0, 106.0, 94.0, 103.0)));
        assert_eq!(classified[0].shape, Shape::Down);
        assert_eq!(classified[1].shape, Shape::Up);

        let events = Reversal22Detector::default().detect(&classified, &clock);
        assert_eq!(events.len(), 1);
        let levels = events[0].levels.unwrap();
        assert_eq!(events[0].direction, Some(Direction::Bullish));
        assert_eq!((levels.entry, levels.stop, levels.target), (103.0, 93.0, 123.0));
    }

    #[test]
    fn test_gap_open_is_rejected() {
        let clock = SessionClock::new(New_York);
        let classified = classify_series(&day(bucket(8, 104.5, 106.0, 100.0, 105.0)));
        assert_eq!(classified[1].shape, Shape::Up);
        assert!(Reversal22Detector::default().detect(&classified, &clock).is_empty());
    }

    #[test]
    fn test_open_on_range_edge_is_accepted() {
        let clock = SessionClock::new(New_York);
        let classified = classify_series(&day(bucket(8, 104.0, 106.0, 100.0, 105.0)));
        assert_eq!(Reversal22Detector::default().detect(&classified, &clock).len(), 1);
    }

    #[test]
    fn test_continuation_is_not_reversal() {
        let clock = SessionClock::new(New_York);
        let classified = classify_series(&day(bucket(8, 96.0, 103.0, 90.0, 91.0)));
        assert_eq!(classified[1].shape, Shape::Down);
        assert!(Reversal22Detector::default().detect(&classified, &clock).is_empty());
    }

    #[test]
    fn test_missing_first_bucket() {
        let clock = SessionClock::new(New_York);
        let bars = vec![
            bucket(0, 100.0, 105.0, 95.0, 100.0),
            bucket(8, 97.0, 106.0, 94.0, 103.0),
        ];
        assert!(Reversal22Detector::default().detect(&classify_series(&bars), &clock).is_empty());
    }

    #[test]
    fn test_config_validation() {
        let bad = Reversal22Detector { first_hour: 8, second_hour: 4 };
        assert!(bad.validate_config().is_err());
        assert!(Reversal22Detector::default().validate_config().is_ok());
    }
}
