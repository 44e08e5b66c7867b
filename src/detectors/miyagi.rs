//! 1-3-1 "Miyagi" detector (12-hour buckets)
//!
//! Inside, outside, inside. The third bar completes the pattern and emits a pending event with
//! entry at its midpoint. A following directional bar confirms it, fading the breakout:
//! `2U` confirms bearish, `2D` confirms bullish.

use crate::{
    clock::SessionClock,
    shape::{ClassifiedBar, Shape},
    Direction, OHLCVExt, PatternDetector, PatternEvent, PatternType, Stage,
};

/// 1-3-1 detector
#[derive(Debug, Clone, Default)]
pub struct MiyagiDetector;

impl PatternDetector for MiyagiDetector {
    fn pattern(&self) -> PatternType {
        PatternType::Miyagi
    }

    fn min_bars(&self) -> usize {
        3
    }

    fn detect(&self, bars: &[ClassifiedBar], _clock: &SessionClock) -> Vec<PatternEvent> {
        let mut events = Vec::new();

        for i in 2..bars.len() {
            let (first, middle, last) = (&bars[i - 2], &bars[i - 1], &bars[i]);
            if first.shape != Shape::Inside
                || middle.shape != Shape::Outside
                || last.shape != Shape::Inside
            {
                continue;
            }

            let entry = last.bar.midpoint();
            let anchor_millis = last.bar.end_millis;
            let pattern_bars = vec![*first, *middle, *last];

            events.push(PatternEvent {
                pattern: PatternType::Miyagi,
                stage: Stage::Pending,
                direction: None,
                anchor_millis,
                entry,
                levels: None,
                supporting: pattern_bars.clone(),
            });

            // Fade the breakout of the final inside bar
            let Some(next) = bars.get(i + 1) else {
                continue;
            };
            let direction = match next.shape {
                Shape::Up => Direction::Bearish,
                Shape::Down => Direction::Bullish,
                Shape::Inside | Shape::Outside => continue,
            };
            let mut supporting = pattern_bars;
            supporting.push(*next);

            events.push(PatternEvent {
                pattern: PatternType::Miyagi,
                stage: Stage::Confirmed,
                direction: Some(direction),
                anchor_millis,
                entry,
                levels: None,
                supporting,
            });
        }

        events
    }
}
