//! Clock-anchored timeframe composition
//!
//! Folds a fine base series (typically 60-minute bars) into coarser buckets whose boundaries
//! sit on fixed local wall-clock hours:
//!
//! - 4-hour buckets close at local `00, 04, 08, 12, 16, 20`
//! - 12-hour buckets close at local `08:00` and `20:00`
//!
//! Buckets are half-open: a base bar starting exactly on a boundary opens the next bucket.
//! Composed bars carry the bucket's local start and end instants, so a composed bar starting
//! at `08:00` covers `[08:00, 20:00)` on the 12-hour rule.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;

use crate::{clock::SessionClock, Bar, Result, StratError};

// ============================================================
// TIMEFRAMES
// ============================================================

/// Timeframes the scanner works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Timeframe {
    #[serde(rename = "60m")]
    Minutes60,
    #[serde(rename = "4h")]
    Hours4,
    #[serde(rename = "12h")]
    Hours12,
}

impl Timeframe {
    pub fn minutes(self) -> u32 {
        match self {
            Timeframe::Minutes60 => 60,
            Timeframe::Hours4 => 240,
            Timeframe::Hours12 => 720,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Timeframe::Minutes60 => "60m",
            Timeframe::Hours4 => "4h",
            Timeframe::Hours12 => "12h",
        }
    }

    pub fn bucket_rule(self) -> BucketRule {
        match self {
            Timeframe::Minutes60 => BucketRule::HOURLY,
            Timeframe::Hours4 => BucketRule::FOUR_HOUR,
            Timeframe::Hours12 => BucketRule::TWELVE_HOUR,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================
// BUCKET RULE
// ============================================================

/// Boundaries every `width_hours`, starting from local `anchor_hour`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRule {
    width_hours: u32,
    anchor_hour: u32,
}

impl BucketRule {
    pub const HOURLY: Self = Self {
        width_hours: 1,
        anchor_hour: 0,
    };
    pub const FOUR_HOUR: Self = Self {
        width_hours: 4,
        anchor_hour: 0,
    };
    pub const TWELVE_HOUR: Self = Self {
        width_hours: 12,
        anchor_hour: 8,
    };

    /// Width must divide the day evenly so every local day has the same boundaries
    pub fn new(width_hours: u32, anchor_hour: u32) -> Result<Self> {
        if width_hours == 0 || 24 % width_hours != 0 {
            return Err(StratError::InvalidConfig(format!(
                "bucket width {width_hours}h does not divide 24h"
            )));
        }
        if anchor_hour >= 24 {
            return Err(StratError::OutOfRange {
                field: "anchor_hour",
                value: anchor_hour as f64,
                min: 0.0,
                max: 23.0,
            });
        }
        Ok(Self {
            width_hours,
            anchor_hour: anchor_hour % width_hours,
        })
    }

    /// Rule for a bucket width given in minutes (240 -> 4h, 720 -> 12h, 60 -> hourly)
    pub fn for_width_minutes(minutes: u32) -> Result<Self> {
        match minutes {
            60 => Ok(Self::HOURLY),
            240 => Ok(Self::FOUR_HOUR),
            720 => Ok(Self::TWELVE_HOUR),
            other => Err(StratError::InvalidConfig(format!(
                "no clock-anchored rule for {other}-minute buckets"
            ))),
        }
    }

    #[inline]
    pub fn width_hours(&self) -> u32 {
        self.width_hours
    }

    /// Local hours on which buckets open and close, ascending
    pub fn boundary_hours(&self) -> Vec<u32> {
        let mut hours: Vec<u32> = (0..24 / self.width_hours)
            .map(|k| (self.anchor_hour + k * self.width_hours) % 24)
            .collect();
        hours.sort_unstable();
        hours
    }

    /// Local `[start, end)` of the bucket containing `local`
    pub fn bucket_bounds(&self, local: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let hour = local.hour();
        let date = local.date();
        let anchor_date = if hour >= self.anchor_hour {
            date
        } else {
            date.pred_opt()?
        };
        let day_anchor = anchor_date.and_time(NaiveTime::from_hms_opt(self.anchor_hour, 0, 0)?);

        let offset = (hour + 24 - self.anchor_hour) % 24;
        let index = offset / self.width_hours;
        let start = day_anchor + Duration::hours(i64::from(index * self.width_hours));
        let end = start + Duration::hours(i64::from(self.width_hours));
        Some((start, end))
    }
}

// ============================================================
// COMPOSER
// ============================================================

/// Accumulator for one bucket; exists only once a bar contributes to it
#[derive(Debug, Clone, Copy)]
struct Bucket {
    start_millis: i64,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    contributors: usize,
}

impl Bucket {
    fn open_with(start_millis: i64, bar: &Bar) -> Self {
        Self {
            start_millis,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            contributors: 1,
        }
    }

    fn absorb(&mut self, bar: &Bar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
        self.volume += bar.volume;
        self.contributors += 1;
    }

    fn into_bar(self, end_millis: i64) -> Bar {
        Bar::new(self.open, self.high, self.low, self.close, self.volume)
            .spanning(self.start_millis, end_millis)
    }
}

/// Compose `bars` into clock-anchored buckets.
///
/// `bars` must be sorted by `start_millis` ascending (not re-checked): the last contributor
/// sets a bucket's close. Output is sorted by bucket end. Empty input yields empty output.
pub fn compose(bars: &[Bar], rule: BucketRule, clock: &SessionClock) -> Vec<Bar> {
    let mut buckets: BTreeMap<i64, Bucket> = BTreeMap::new();

    for bar in bars {
        let Some((start, end)) = clock
            .local_naive(bar.start_millis)
            .and_then(|local| rule.bucket_bounds(local))
        else {
            debug!(start_millis = bar.start_millis, "bar timestamp outside calendar range");
            continue;
        };
        let (Some(start_millis), Some(end_millis)) =
            (clock.resolve_millis(start), clock.resolve_millis(end))
        else {
            continue;
        };

        buckets
            .entry(end_millis)
            .and_modify(|bucket| bucket.absorb(bar))
            .or_insert_with(|| Bucket::open_with(start_millis, bar));
    }

    debug!(
        input = bars.len(),
        output = buckets.len(),
        width_hours = rule.width_hours,
        "composed buckets"
    );

    buckets
        .into_iter()
        .filter(|(_, bucket)| bucket.contributors > 0)
        .map(|(end, bucket)| bucket.into_bar(end))
        .collect()
}

// ============================================================
// TESTS
// ============================================================
