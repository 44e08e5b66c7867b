//! # stratscan - clock-anchored bar shape scanning
//!
//! Classifies price bars into the `1` / `2U` / `2D` / `3` shape alphabet, folds a base series
//! into clock-anchored 4-hour and 12-hour buckets, and searches the classified sequences for
//! three reversal patterns (1-3-1 "Miyagi", 3-2-2 and 2-2). Detected patterns are scored,
//! gated by wall-clock alert windows and deduplicated per trading day.
//!
//! ## Quick Start
//!
//! ```rust
//! use stratscan::prelude::*;
//!
//! let clock = SessionClock::new(chrono_tz::America::New_York);
//! let detectors = DetectorSet::new().with_all_defaults();
//!
//! // 60-minute base bars from your data provider
//! let base: Vec<Bar> = vec![];
//! let four_hour = compose(&base, BucketRule::FOUR_HOUR, &clock);
//! let classified = classify_series(&four_hour);
//! let events = detectors.scan_timeframe(Timeframe::Hours4, &classified, &clock);
//! assert!(events.is_empty());
//! ```

pub mod alert;
pub mod align;
pub mod clock;
pub mod compose;
pub mod config;
pub mod detectors;
pub mod gate;
pub mod scan;
pub mod score;
pub mod shape;
pub mod sources;

pub mod prelude {
    pub use crate::{
        // Alerts
        alert::Alert,
        // Alignment
        align::{ensure_aligned, is_aligned, resolve_series, ResolvedSeries, SeriesSource},
        // Clock
        clock::SessionClock,
        // Composition
        compose::{compose, BucketRule, Timeframe},
        // Config
        config::ScannerConfig,
        // Detectors
        detectors::*,
        // Gate
        gate::{AlertGate, AlertKey, AlertWindow, AlertWindows, Deduplicator, DeliveryOutcome, GateDecision},
        // Orchestration
        scan::{ScanReport, Scanner, SymbolError, SymbolOutcome, SymbolSummary},
        // Scoring
        score::{score, ConfidenceScorer},
        // Shapes
        shape::{classify, classify_series, ClassifiedBar, Shape},
        // Collaborators
        sources::{AlertSink, AlertStore, DeliveryError, FetchError, MarketData, MemoryStore, StoreError},
        // Core types
        Bar,
        BuiltinDetector,
        Confidence,
        DetectorSet,
        Direction,
        OHLCVExt,
        OptionSide,
        PatternDetector,
        PatternEvent,
        PatternType,
        Result,
        Stage,
        StratError,
        TradeLevels,
        OHLCV,
    };
}

use std::fmt;

use clock::SessionClock;
use compose::Timeframe;
use shape::ClassifiedBar;
use sources::{DeliveryError, FetchError, StoreError};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, StratError>;

/// Errors raised by the scanning pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum StratError {
    /// OHLC invariant violated. `index` is the position of the offending bar in its input.
    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Insufficient history: need {need} bars, got {got}")]
    InsufficientHistory { need: usize, got: usize },

    #[error("{timeframe} series is not aligned to its clock boundaries")]
    MisalignedSeries { timeframe: Timeframe },

    #[error("Data fetch failed: {0}")]
    DataFetch(#[from] FetchError),

    #[error("Alert delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Alert store failed: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Could not start scan pool: {0}")]
    ThreadPool(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Alert confidence, always within [`Confidence::MIN`]..=[`Confidence::MAX`]
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f64);

impl Confidence {
    pub const MIN: f64 = 0.40;
    pub const MAX: f64 = 0.95;

    /// Create a Confidence, rejecting values outside the scoring bounds
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(StratError::InvalidValue(
                "Confidence cannot be NaN or infinite",
            ));
        }
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(StratError::OutOfRange {
                field: "Confidence",
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    /// Clamp any raw score into bounds. Non-finite input maps to the lower bound.
    pub fn clamped(value: f64) -> Self {
        if value.is_finite() {
            Self(value.clamp(Self::MIN, Self::MAX))
        } else {
            Self(Self::MIN)
        }
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Confidence {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Confidence {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Confidence::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn midpoint(&self) -> f64 {
        (self.high() + self.low()) / 2.0
    }

    /// Range as a fraction of close. Returns None if close is not positive.
    #[inline]
    fn range_pct(&self) -> Option<f64> {
        let close = self.close();
        (close > 0.0).then(|| self.range() / close)
    }

    /// Validate OHLC consistency: `low <= open, close <= high`, finite prices, non-negative volume
    fn validate(&self) -> Result<()> {
        let prices = [self.open(), self.high(), self.low(), self.close()];
        if prices.iter().any(|p| p.is_nan()) {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "NaN in OHLC",
            });
        }
        if prices.iter().any(|p| p.is_infinite()) {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLC",
            });
        }
        if self.high() < self.low() {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open() < self.low() || self.open() > self.high() {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "open outside [low, high]",
            });
        }
        if self.close() < self.low() || self.close() > self.high() {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "close outside [low, high]",
            });
        }
        if self.volume().is_nan() || self.volume() < 0.0 {
            return Err(StratError::InvalidBar {
                index: 0,
                reason: "negative or NaN volume",
            });
        }
        Ok(())
    }

    /// Like [`OHLCVExt::validate`] but reports the bar's position in its sequence
    fn validate_at(&self, index: usize) -> Result<()> {
        self.validate().map_err(|e| match e {
            StratError::InvalidBar { reason, .. } => StratError::InvalidBar { index, reason },
            other => other,
        })
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// BAR
// ============================================================

/// A price bar covering `[start_millis, end_millis)` (epoch milliseconds, UTC)
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub start_millis: i64,
    pub end_millis: i64,
}

impl Bar {
    /// Bar with prices only; place it in time with [`Bar::spanning`]
    pub fn new(open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            start_millis: 0,
            end_millis: 0,
        }
    }

    pub fn spanning(mut self, start_millis: i64, end_millis: i64) -> Self {
        self.start_millis = start_millis;
        self.end_millis = end_millis;
        self
    }
}

impl OHLCV for Bar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// PATTERN EVENT - result of detection
// ============================================================

/// The three reversal patterns this crate scans for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum PatternType {
    /// 1-3-1 on 12-hour buckets
    Miyagi,
    /// 3-2-2 on the 08/09/10 hourly bars
    Reversal322,
    /// 2-2 on the 04/08 four-hour bars
    Reversal22,
}

impl PatternType {
    pub const ALL: [PatternType; 3] = [
        PatternType::Miyagi,
        PatternType::Reversal322,
        PatternType::Reversal22,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PatternType::Miyagi => "1-3-1",
            PatternType::Reversal322 => "3-2-2",
            PatternType::Reversal22 => "2-2",
        }
    }

    /// Timeframe of the classified sequence the pattern is detected on
    pub fn timeframe(self) -> Timeframe {
        match self {
            PatternType::Miyagi => Timeframe::Hours12,
            PatternType::Reversal322 => Timeframe::Minutes60,
            PatternType::Reversal22 => Timeframe::Hours4,
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction/bias of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
}

impl Direction {
    /// Option side that profits from a move in this direction
    pub fn option_side(self) -> OptionSide {
        match self {
            Direction::Bullish => OptionSide::Calls,
            Direction::Bearish => OptionSide::Puts,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => f.write_str("bullish"),
            Direction::Bearish => f.write_str("bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OptionSide {
    Calls,
    Puts,
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Calls => f.write_str("CALLS"),
            OptionSide::Puts => f.write_str("PUTS"),
        }
    }
}

/// Lifecycle stage of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Stage {
    /// Pattern bars are in place, direction not yet known
    Pending,
    /// Direction resolved
    Confirmed,
}

/// Entry, stop and target of a directional event
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop: f64,
    pub target: f64,
}

impl TradeLevels {
    /// Target placed `multiple` times the entry-to-stop distance away, in the trade's direction
    pub fn with_reward_multiple(direction: Direction, entry: f64, stop: f64, multiple: f64) -> Self {
        let reward = multiple * (entry - stop).abs();
        let target = match direction {
            Direction::Bullish => entry + reward,
            Direction::Bearish => entry - reward,
        };
        Self {
            entry,
            stop,
            target,
        }
    }

    #[inline]
    pub fn risk(&self) -> f64 {
        (self.entry - self.stop).abs()
    }
}

/// A pattern completion found by a detector. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PatternEvent {
    pub pattern: PatternType,
    pub stage: Stage,
    pub direction: Option<Direction>,
    pub anchor_millis: i64,
    pub entry: f64,
    pub levels: Option<TradeLevels>,
    /// Pattern bars in time order; the last one completes the event
    pub supporting: Vec<ClassifiedBar>,
}

impl PatternEvent {
    /// The bar whose arrival produced this event
    pub fn completing_bar(&self) -> Option<&ClassifiedBar> {
        self.supporting.last()
    }
}

// ============================================================
// PATTERN DETECTOR TRAIT
// ============================================================

/// Generic detector interface, implemented once per [`PatternType`]
pub trait PatternDetector: Send + Sync {
    fn pattern(&self) -> PatternType;

    /// Classified bars needed before anything can match
    fn min_bars(&self) -> usize;

    fn detect(&self, bars: &[ClassifiedBar], clock: &SessionClock) -> Vec<PatternEvent>;

    fn timeframe(&self) -> Timeframe {
        self.pattern().timeframe()
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - enum dispatch, no vtable
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect(&self, bars: &[ClassifiedBar], clock: &SessionClock) -> Vec<PatternEvent> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, clock)),*
                }
            }

            #[inline]
            pub fn pattern(&self) -> PatternType {
                match self {
                    $(Self::$variant(d) => PatternDetector::pattern(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            #[inline]
            pub fn timeframe(&self) -> Timeframe {
                match self {
                    $(Self::$variant(d) => PatternDetector::timeframe(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    Miyagi(MiyagiDetector),
    Reversal322(Reversal322Detector),
    Reversal22(Reversal22Detector),
}

// ============================================================
// DETECTOR SET
// ============================================================

/// The detectors a scanner runs, each bound to its timeframe
#[derive(Debug, Clone, Default)]
pub struct DetectorSet {
    detectors: Vec<BuiltinDetector>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all three builtin detectors with default configurations
    pub fn with_all_defaults(mut self) -> Self {
        self.detectors.extend([
            BuiltinDetector::Miyagi(MiyagiDetector::default()),
            BuiltinDetector::Reversal322(Reversal322Detector::default()),
            BuiltinDetector::Reversal22(Reversal22Detector::default()),
        ]);
        self
    }

    /// Add a builtin detector; see [`DetectorSet::validate`]
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Validate every detector's configuration
    pub fn validate(&self) -> Result<()> {
        self.detectors.iter().try_for_each(BuiltinDetector::validate_config)
    }

    /// Keep only the listed patterns
    pub fn only_patterns(mut self, patterns: impl IntoIterator<Item = PatternType>) -> Self {
        let keep: Vec<PatternType> = patterns.into_iter().collect();
        self.detectors.retain(|d| keep.contains(&d.pattern()));
        self
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector bound to `timeframe` over its classified sequence.
    ///
    /// Detectors whose minimum history is not met are skipped silently.
    pub fn scan_timeframe(
        &self,
        timeframe: Timeframe,
        bars: &[ClassifiedBar],
        clock: &SessionClock,
    ) -> Vec<PatternEvent> {
        let mut events = Vec::new();
        for detector in self.detectors.iter().filter(|d| d.timeframe() == timeframe) {
            if bars.len() < detector.min_bars() {
                continue;
            }
            events.extend(detector.detect(bars, clock));
        }
        events
    }
}

// ============================================================
// TESTS
// ============================================================
