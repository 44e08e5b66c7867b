//! Helpers shared by the clock-windowed detectors

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, Timelike};

use crate::{
    clock::SessionClock,
    shape::{ClassifiedBar, Shape},
    Direction, TradeLevels,
};

/// Target distance as a multiple of entry-to-stop risk
pub const REWARD_MULTIPLE: f64 = 2.0;

/// Bars of one local calendar day, keyed by local start hour
pub type HourIndex = HashMap<u32, usize>;

/// Index a classified sequence by local date and local start hour.
///
/// If two bars share a local hour (sub-hourly input, or the repeated hour on a fall-back day),
/// the first one wins.
pub fn index_by_local_hour(
    bars: &[ClassifiedBar],
    clock: &SessionClock,
) -> BTreeMap<NaiveDate, HourIndex> {
    let mut days: BTreeMap<NaiveDate, HourIndex> = BTreeMap::new();
    for (i, cb) in bars.iter().enumerate() {
        let Some(local) = clock.local_naive(cb.bar.start_millis) else {
            continue;
        };
        days.entry(local.date()).or_default().entry(local.hour()).or_insert(i);
    }
    days
}

/// Direction of a directional-to-opposite pair: `2D -> 2U` is bullish, `2U -> 2D` bearish
#[inline]
pub fn reversal_direction(first: Shape, second: Shape) -> Option<Direction> {
    match (first, second) {
        (Shape::Down, Shape::Up) => Some(Direction::Bullish),
        (Shape::Up, Shape::Down) => Some(Direction::Bearish),
        _ => None,
    }
}

/// Entry at `entry`, stop beyond the reversed bar's extreme, target at [`REWARD_MULTIPLE`]
#[inline]
pub fn reversal_levels(direction: Direction, entry: f64, reversed: &ClassifiedBar) -> TradeLevels {
    let stop = match direction {
        Direction::Bullish => reversed.bar.low,
        Direction::Bearish => reversed.bar.high,
    };
    TradeLevels::with_reward_multiple(direction, entry, stop, REWARD_MULTIPLE)
}
