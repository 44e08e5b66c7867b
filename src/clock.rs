//! Wall-clock conversion for a named timezone.
//!
//! Every conversion between epoch milliseconds and local wall-clock time goes through
//! [`SessionClock`]. Composition, alignment checks, per-hour detector lookups, alert windows and
//! trading dates all ask the same clock, so hour boundaries are computed in exactly one place.
//!
//! Local times that do not exist (spring-forward gaps) resolve to the first instant after the
//! gap; ambiguous local times (fall-back) resolve to the earliest instant.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Gaps are at most an hour in every IANA zone we care about; step minute-wise up to this bound.
const MAX_GAP_MINUTES: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionClock {
    tz: Tz,
}

impl SessionClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    #[inline]
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Local date-time of an epoch-millisecond instant. None if out of chrono's range.
    pub fn local(&self, millis: i64) -> Option<DateTime<Tz>> {
        DateTime::<Utc>::from_timestamp_millis(millis).map(|utc| utc.with_timezone(&self.tz))
    }

    pub fn local_naive(&self, millis: i64) -> Option<NaiveDateTime> {
        self.local(millis).map(|dt| dt.naive_local())
    }

    pub fn local_hour(&self, millis: i64) -> Option<u32> {
        self.local(millis).map(|dt| dt.hour())
    }

    pub fn local_date(&self, millis: i64) -> Option<NaiveDate> {
        self.local(millis).map(|dt| dt.date_naive())
    }

    /// Trading date: the calendar date of `now` in this clock's zone
    pub fn trading_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.tz).date_naive()
    }

    /// Wall-clock time of day of `now`
    pub fn time_of_day(&self, now: DateTime<Utc>) -> NaiveTime {
        now.with_timezone(&self.tz).time()
    }

    pub fn hour_of_day(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.tz).hour()
    }

    /// Resolve a local wall-clock time to UTC.
    ///
    /// Ambiguous times pick the earliest instant; nonexistent times shift forward minute by
    /// minute to the first valid instant.
    pub fn resolve(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        if let Some(dt) = self.tz.from_local_datetime(&naive).earliest() {
            return Some(dt.with_timezone(&Utc));
        }
        (1..=MAX_GAP_MINUTES).find_map(|m| {
            self.tz
                .from_local_datetime(&(naive + Duration::minutes(m)))
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    pub fn resolve_millis(&self, naive: NaiveDateTime) -> Option<i64> {
        self.resolve(naive).map(|dt| dt.timestamp_millis())
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}
