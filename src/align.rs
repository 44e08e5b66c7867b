//! Boundary alignment checks for natively fetched coarse series
//!
//! A provider can serve 4h/12h bars directly, but its buckets are often anchored to UTC or to
//! exchange sessions rather than to the local boundaries the detectors assume. The check here is
//! a heuristic gate: when it fails, the native series is discarded and rebuilt with
//! [`crate::compose::compose`] from the finer base series.

use chrono::Timelike;
use tracing::info;

use crate::{
    clock::SessionClock,
    compose::{compose, Timeframe},
    Bar, Result, StratError,
};

/// Number of trailing bars inspected
pub const INSPECTED_BARS: usize = 3;

/// True iff at least half of the last [`INSPECTED_BARS`] bars start on an expected local hour,
/// within `tolerance_minutes` past the hour. An empty series is never aligned.
pub fn is_aligned(
    bars: &[Bar],
    expected_hours: &[u32],
    tolerance_minutes: u32,
    clock: &SessionClock,
) -> bool {
    let inspected = &bars[bars.len().saturating_sub(INSPECTED_BARS)..];
    if inspected.is_empty() {
        return false;
    }

    let aligned = inspected
        .iter()
        .filter(|bar| {
            let Some(local) = clock.local(bar.start_millis) else {
                return false;
            };
            expected_hours.contains(&local.hour()) && local.minute() <= tolerance_minutes
        })
        .count();

    aligned * 2 >= inspected.len()
}

/// [`is_aligned`] against the boundaries of `timeframe`, as a `Result`
pub fn ensure_aligned(
    bars: &[Bar],
    timeframe: Timeframe,
    tolerance_minutes: u32,
    clock: &SessionClock,
) -> Result<()> {
    let expected = timeframe.bucket_rule().boundary_hours();
    if is_aligned(bars, &expected, tolerance_minutes, clock) {
        Ok(())
    } else {
        Err(StratError::MisalignedSeries { timeframe })
    }
}

/// Where a coarse series came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesSource {
    Native,
    Composed,
}

#[derive(Debug, Clone)]
pub struct ResolvedSeries {
    pub timeframe: Timeframe,
    pub source: SeriesSource,
    pub bars: Vec<Bar>,
}

/// Pick the native series if it is aligned, otherwise compose from `base`.
pub fn resolve_series(
    native: Option<Vec<Bar>>,
    base: &[Bar],
    timeframe: Timeframe,
    tolerance_minutes: u32,
    clock: &SessionClock,
) -> ResolvedSeries {
    if let Some(native) = native.filter(|bars| !bars.is_empty()) {
        match ensure_aligned(&native, timeframe, tolerance_minutes, clock) {
            Ok(()) => {
                return ResolvedSeries {
                    timeframe,
                    source: SeriesSource::Native,
                    bars: native,
                }
            }
            Err(error) => info!(%timeframe, %error, "falling back to composed series"),
        }
    }

    ResolvedSeries {
        timeframe,
        source: SeriesSource::Composed,
        bars: compose(base, timeframe.bucket_rule(), clock),
    }
}
