//! Alert windows, the confidence floor and per-trading-day deduplication
//!
//! Eligibility depends only on the current local wall-clock time and the event's confidence,
//! never on when the pattern completed. Deduplication is keyed on
//! `(symbol, pattern, timeframe, trading date)`; the persistent store is the source of truth and
//! the in-process cache is a fast path only.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info, warn};

use crate::{
    alert::Alert,
    compose::Timeframe,
    sources::{AlertSink, AlertStore, DeliveryError},
    Confidence, PatternType, Result, StratError,
};

// ============================================================
// WINDOWS
// ============================================================

/// Half-open local time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AlertWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl AlertWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Result<Self> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    /// Build from `(hour, minute)` pairs. None if either is out of range.
    pub fn hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
        Some(Self {
            start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
            end: NaiveTime::from_hms_opt(end.0, end.1, 0)?,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.end <= self.start {
            return Err(StratError::InvalidConfig(format!(
                "alert window end {} must be after start {}",
                self.end.format("%H:%M"),
                self.start.format("%H:%M")
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn contains(&self, time: NaiveTime) -> bool {
        self.start <= time && time < self.end
    }
}

/// Per-pattern alert windows
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AlertWindows {
    pub miyagi: Vec<AlertWindow>,
    pub reversal_322: Vec<AlertWindow>,
    pub reversal_22: Vec<AlertWindow>,
}

impl Default for AlertWindows {
    fn default() -> Self {
        let pair = |a: (u32, u32), b: (u32, u32), c: (u32, u32), d: (u32, u32)| {
            [AlertWindow::hm(a, b), AlertWindow::hm(c, d)]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
        };
        Self {
            miyagi: pair((20, 0), (20, 30), (21, 0), (21, 15)),
            reversal_322: pair((10, 0), (10, 30), (11, 0), (11, 15)),
            reversal_22: pair((8, 0), (8, 30), (9, 0), (9, 15)),
        }
    }
}

impl AlertWindows {
    pub fn for_pattern(&self, pattern: PatternType) -> &[AlertWindow] {
        match pattern {
            PatternType::Miyagi => &self.miyagi,
            PatternType::Reversal322 => &self.reversal_322,
            PatternType::Reversal22 => &self.reversal_22,
        }
    }

    pub fn validate(&self) -> Result<()> {
        PatternType::ALL
            .iter()
            .flat_map(|p| self.for_pattern(*p))
            .try_for_each(AlertWindow::validate)
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(&raw, "%H:%M").map_err(serde::de::Error::custom)
    }
}

// ============================================================
// GATE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Eligible,
    OutsideWindow,
    LowConfidence,
}

#[derive(Debug, Clone)]
pub struct AlertGate {
    pub windows: AlertWindows,
    pub min_confidence: f64,
}

impl Default for AlertGate {
    fn default() -> Self {
        Self {
            windows: AlertWindows::default(),
            min_confidence: 0.50,
        }
    }
}

impl AlertGate {
    pub fn new(windows: AlertWindows, min_confidence: f64) -> Self {
        Self {
            windows,
            min_confidence,
        }
    }

    /// Whether `pattern` may alert at local wall-clock `time`
    pub fn is_eligible_at(&self, pattern: PatternType, time: NaiveTime) -> bool {
        self.windows
            .for_pattern(pattern)
            .iter()
            .any(|w| w.contains(time))
    }

    pub fn admits(&self, pattern: PatternType, confidence: Confidence, time: NaiveTime) -> GateDecision {
        if !self.is_eligible_at(pattern, time) {
            GateDecision::OutsideWindow
        } else if confidence.get() < self.min_confidence {
            GateDecision::LowConfidence
        } else {
            GateDecision::Eligible
        }
    }
}

// ============================================================
// DEDUPLICATION
// ============================================================

/// Deduplication key: at most one alert per key
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AlertKey {
    pub symbol: String,
    pub pattern: PatternType,
    pub timeframe: Timeframe,
    pub trading_date: NaiveDate,
}

impl AlertKey {
    pub fn new(symbol: &str, pattern: PatternType, trading_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            pattern,
            timeframe: pattern.timeframe(),
            trading_date,
        }
    }
}

#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Sent,
    /// Already alerted for this key, or another scan is delivering it right now
    Suppressed,
    /// The sink failed; nothing was recorded and the key stays eligible
    Failed(DeliveryError),
}

#[derive(Debug, Default)]
struct AlertedToday {
    date: Option<NaiveDate>,
    keys: HashSet<AlertKey>,
}

/// Single-writer dedup in front of an [`AlertStore`]
#[derive(Debug, Default)]
pub struct Deduplicator {
    cache: Mutex<AlertedToday>,
    in_flight: Mutex<HashSet<AlertKey>>,
}

/// Releases an in-flight key on drop
struct InFlight<'a> {
    set: &'a Mutex<HashSet<AlertKey>>,
    key: AlertKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the cache when the trading date changes. Returns true if a rollover happened.
    pub fn roll_over(&self, today: NaiveDate) -> bool {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.date == Some(today) {
            return false;
        }
        let cleared = cache.keys.len();
        cache.keys.clear();
        cache.date = Some(today);
        debug!(%today, cleared, "alert cache rolled over");
        true
    }

    fn cached(&self, key: &AlertKey) -> bool {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.date == Some(key.trading_date) && cache.keys.contains(key)
    }

    fn remember(&self, key: &AlertKey) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.date == Some(key.trading_date) {
            cache.keys.insert(key.clone());
        }
    }

    fn claim(&self, key: &AlertKey) -> Option<InFlight<'_>> {
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(key.clone()) {
            return None;
        }
        Some(InFlight {
            set: &self.in_flight,
            key: key.clone(),
        })
    }

    /// Deliver `alert` unless `key` was already alerted.
    ///
    /// The record is written only after the sink confirms delivery. Store read failures are
    /// returned as errors; a record failure after delivery is logged and still counts as sent.
    pub fn deliver_once<K, T>(
        &self,
        key: &AlertKey,
        alert: &Alert,
        sink: &K,
        store: &T,
    ) -> Result<DeliveryOutcome>
    where
        K: AlertSink + ?Sized,
        T: AlertStore + ?Sized,
    {
        if self.cached(key) {
            return Ok(DeliveryOutcome::Suppressed);
        }
        let Some(_guard) = self.claim(key) else {
            debug!(symbol = %key.symbol, pattern = %key.pattern, "delivery already in flight");
            return Ok(DeliveryOutcome::Suppressed);
        };
        // A concurrent delivery may have completed between the cache check and the claim
        if self.cached(key) {
            return Ok(DeliveryOutcome::Suppressed);
        }

        if store.exists_alert(key)? {
            self.remember(key);
            return Ok(DeliveryOutcome::Suppressed);
        }

        if let Err(e) = sink.deliver(alert) {
            warn!(symbol = %key.symbol, pattern = %key.pattern, error = %e, "alert delivery failed");
            return Ok(DeliveryOutcome::Failed(e));
        }

        if let Err(e) = store.record_alert(key, alert) {
            warn!(symbol = %key.symbol, pattern = %key.pattern, error = %e, "alert sent but not recorded");
        }
        self.remember(key);
        info!(
            symbol = %key.symbol,
            pattern = %key.pattern,
            timeframe = %key.timeframe,
            date = %key.trading_date,
            "alert sent"
        );
        Ok(DeliveryOutcome::Sent)
    }
}
