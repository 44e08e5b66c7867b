//! 3-2-2 reversal detector (60-minute bars)
//!
//! Per local calendar day:
//! - the `outside_hour` bar (08:00) is `3` against the bar of the hour before it
//! - the next hour (09:00) is `2U` or `2D` against it
//! - the hour after (10:00) is the opposite directional shape
//!
//! Entry is the close of the reversal bar, stop the far extreme of the 09:00 bar, target 2R.

use crate::{
    clock::SessionClock,
    shape::{ClassifiedBar, Shape},
    PatternDetector, PatternEvent, PatternType, Result, Stage, StratError,
};

use super::helpers::{index_by_local_hour, reversal_direction, reversal_levels};

/// 3-2-2 detector
#[derive(Debug, Clone)]
pub struct Reversal322Detector {
    /// Local hour of the outside bar; the two directional bars follow it
    pub outside_hour: u32,
}

impl Default for Reversal322Detector {
    fn default() -> Self {
        Self { outside_hour: 8 }
    }
}

impl PatternDetector for Reversal322Detector {
    fn pattern(&self) -> PatternType {
        PatternType::Reversal322
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn validate_config(&self) -> Result<()> {
        if self.outside_hour == 0 || self.outside_hour > 21 {
            return Err(StratError::OutOfRange {
                field: "outside_hour",
                value: self.outside_hour as f64,
                min: 1.0,
                max: 21.0,
            });
        }
        Ok(())
    }

    fn detect(&self, bars: &[ClassifiedBar], clock: &SessionClock) -> Vec<PatternEvent> {
        let Some(prior_hour) = self.outside_hour.checked_sub(1) else {
            return Vec::new();
        };
        let (Some(h2a), Some(h2b)) = (
            self.outside_hour.checked_add(1),
            self.outside_hour.checked_add(2),
        ) else {
            return Vec::new();
        };
        let h3 = self.outside_hour;

        let mut events = Vec::new();
        for (date, hours) in index_by_local_hour(bars, clock) {
            let (Some(&i3), Some(&i2a), Some(&i2b)) =
                (hours.get(&h3), hours.get(&h2a), hours.get(&h2b))
            else {
                continue;
            };
            let (outside, first, second) = (&bars[i3], &bars[i2a], &bars[i2b]);

            // Each shape must have been measured against the expected predecessor
            let prior_is_expected = clock.local_date(outside.prev_start_millis) == Some(date)
                && clock.local_hour(outside.prev_start_millis) == Some(prior_hour);
            if !prior_is_expected || !first.follows(outside) || !second.follows(first) {
                continue;
            }

            if outside.shape != Shape::Outside {
                continue;
            }
            let Some(direction) = reversal_direction(first.shape, second.shape) else {
                continue;
            };

            let levels = reversal_levels(direction, second.bar.close, first);
            events.push(PatternEvent {
                pattern: PatternType::Reversal322,
                stage: Stage::Confirmed,
                direction: Some(direction),
                anchor_millis: second.bar.end_millis,
                entry: levels.entry,
                levels: Some(levels),
                supporting: vec![*outside, *first, *second],
            });
        }
        events
    }
}
