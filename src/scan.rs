//! Scan orchestration
//!
//! One scan cycle runs every watchlist symbol through fetch, compose, classify, detect, score,
//! gate and dedup on a bounded rayon pool. A failure in one symbol never aborts the others: it
//! is recorded in that symbol's [`SymbolOutcome`] and counted in [`ScanReport::errors`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Days, NaiveDate, Utc};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    alert::Alert,
    align::resolve_series,
    clock::SessionClock,
    compose::{compose, BucketRule, Timeframe},
    config::ScannerConfig,
    gate::{AlertGate, AlertKey, Deduplicator, DeliveryOutcome, GateDecision},
    score::ConfidenceScorer,
    shape::classify_series,
    sources::{AlertSink, AlertStore, MarketData},
    Bar, DetectorSet, PatternEvent, Result, StratError,
};

/// Bars needed before anything can be classified
const MIN_BASE_BARS: usize = 2;

// ============================================================
// REPORTS
// ============================================================

#[derive(Debug, Clone, thiserror::Error)]
#[error("{symbol}: {error}")]
pub struct SymbolError {
    pub symbol: String,
    pub error: StratError,
}

/// What happened to one symbol during a scan cycle
#[derive(Debug, Clone, Default)]
pub struct SymbolSummary {
    pub symbol: String,
    /// Events found anywhere in the lookback window
    pub detected: usize,
    /// Events completing on the current trading date
    pub fresh: usize,
    pub sent: Vec<Alert>,
    pub suppressed: usize,
    pub gated_out: usize,
    pub delivery_failures: usize,
    pub store_failures: usize,
}

#[derive(Debug, Clone)]
pub enum SymbolOutcome {
    Scanned(SymbolSummary),
    Insufficient { symbol: String, bars: usize },
    Failed(SymbolError),
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Scanned(summary) => &summary.symbol,
            SymbolOutcome::Insufficient { symbol, .. } => symbol,
            SymbolOutcome::Failed(e) => &e.symbol,
        }
    }
}

/// Totals of one scan cycle, outcomes in watchlist order
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub trading_date: Option<NaiveDate>,
    pub scanned: usize,
    pub alerts_sent: usize,
    pub insufficient: usize,
    pub errors: usize,
    pub outcomes: Vec<SymbolOutcome>,
}

impl ScanReport {
    fn from_outcomes(trading_date: NaiveDate, outcomes: Vec<SymbolOutcome>) -> Self {
        let mut report = Self {
            trading_date: Some(trading_date),
            ..Self::default()
        };
        for outcome in &outcomes {
            match outcome {
                SymbolOutcome::Scanned(summary) => {
                    report.scanned += 1;
                    report.alerts_sent += summary.sent.len();
                }
                SymbolOutcome::Insufficient { .. } => report.insufficient += 1,
                SymbolOutcome::Failed(_) => report.errors += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }

    /// Every alert delivered this cycle
    pub fn sent(&self) -> impl Iterator<Item = &Alert> {
        self.outcomes.iter().flat_map(|outcome| match outcome {
            SymbolOutcome::Scanned(summary) => summary.sent.as_slice(),
            _ => &[],
        })
    }
}

// ============================================================
// SCANNER
// ============================================================

pub struct Scanner<D, K, S> {
    config: ScannerConfig,
    clock: SessionClock,
    gate: AlertGate,
    scorer: ConfidenceScorer,
    detectors: DetectorSet,
    dedup: Deduplicator,
    data: D,
    sink: K,
    store: S,
    pool: rayon::ThreadPool,
    errors: AtomicU64,
}

impl<D, K, S> Scanner<D, K, S>
where
    D: MarketData,
    K: AlertSink,
    S: AlertStore,
{
    pub fn new(config: ScannerConfig, data: D, sink: K, store: S) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency)
            .thread_name(|i| format!("stratscan-{i}"))
            .build()
            .map_err(|e| StratError::ThreadPool(e.to_string()))?;

        Ok(Self {
            clock: config.clock(),
            gate: config.gate(),
            scorer: ConfidenceScorer::default(),
            detectors: DetectorSet::new().with_all_defaults(),
            dedup: Deduplicator::new(),
            config,
            data,
            sink,
            store,
            pool,
            errors: AtomicU64::new(0),
        })
    }

    /// Replace the default detector set, rejecting invalid detector configurations
    pub fn with_detectors(mut self, detectors: DetectorSet) -> Result<Self> {
        detectors.validate()?;
        self.detectors = detectors;
        Ok(self)
    }

    pub fn with_scorer(mut self, scorer: ConfidenceScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Symbol failures over the scanner's lifetime
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Run one scan cycle over the whole watchlist as of `now`
    pub fn run_once(&self, now: DateTime<Utc>) -> ScanReport {
        let today = self.clock.trading_date(now);
        self.dedup.roll_over(today);

        let outcomes: Vec<SymbolOutcome> = self.pool.install(|| {
            self.config
                .watchlist
                .par_iter()
                .map(|symbol| self.scan_symbol(symbol, now))
                .collect()
        });

        let report = ScanReport::from_outcomes(today, outcomes);
        debug!(
            %today,
            scanned = report.scanned,
            alerts = report.alerts_sent,
            insufficient = report.insufficient,
            errors = report.errors,
            "scan cycle finished"
        );
        report
    }

    /// Scan a single symbol; never panics or propagates
    pub fn scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> SymbolOutcome {
        debug!(symbol = %symbol, "scanning");
        match self.try_scan_symbol(symbol, now) {
            Ok(summary) => SymbolOutcome::Scanned(summary),
            Err(StratError::InsufficientHistory { got, .. }) => {
                debug!(symbol = %symbol, bars = got, "insufficient history");
                SymbolOutcome::Insufficient {
                    symbol: symbol.to_string(),
                    bars: got,
                }
            }
            Err(error) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %symbol, %error, "symbol scan failed");
                SymbolOutcome::Failed(SymbolError {
                    symbol: symbol.to_string(),
                    error,
                })
            }
        }
    }

    fn try_scan_symbol(&self, symbol: &str, now: DateTime<Utc>) -> Result<SymbolSummary> {
        let today = self.clock.trading_date(now);
        let from = today
            .checked_sub_days(Days::new(u64::from(self.config.lookback_days)))
            .unwrap_or(today);

        let base = self
            .data
            .fetch_bars(symbol, self.config.base_granularity_minutes, from, today)?;
        if base.len() < MIN_BASE_BARS {
            return Err(StratError::InsufficientHistory {
                need: MIN_BASE_BARS,
                got: base.len(),
            });
        }

        let hourly = if self.config.base_granularity_minutes == Timeframe::Minutes60.minutes() {
            base
        } else {
            compose(&base, BucketRule::HOURLY, &self.clock)
        };

        let mut series = vec![(Timeframe::Minutes60, hourly)];
        for timeframe in [Timeframe::Hours4, Timeframe::Hours12] {
            let native = self.fetch_native(symbol, timeframe, from, today);
            let resolved = resolve_series(
                native,
                &series[0].1,
                timeframe,
                self.config.alignment_tolerance_minutes,
                &self.clock,
            );
            series.push((timeframe, resolved.bars));
        }

        let mut summary = SymbolSummary {
            symbol: symbol.to_string(),
            ..SymbolSummary::default()
        };
        for (timeframe, bars) in &series {
            if let Err(e) = self.store.save_bars(symbol, *timeframe, bars) {
                warn!(symbol = %symbol, %timeframe, error = %e, "saving bars failed");
            }

            let classified = classify_series(bars);
            let events = self.detectors.scan_timeframe(*timeframe, &classified, &self.clock);
            summary.detected += events.len();

            for event in &events {
                if let Err(e) = self.store.save_pattern(symbol, event) {
                    warn!(symbol = %symbol, pattern = %event.pattern, error = %e, "saving pattern failed");
                }
                if !self.is_fresh(event, today) {
                    continue;
                }
                summary.fresh += 1;
                self.handle_event(symbol, event, bars, now, today, &mut summary);
            }
        }

        debug!(
            symbol = %symbol,
            detected = summary.detected,
            fresh = summary.fresh,
            sent = summary.sent.len(),
            "symbol scanned"
        );
        Ok(summary)
    }

    fn fetch_native(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Option<Vec<Bar>> {
        if !self.config.use_native_coarse {
            return None;
        }
        match self.data.fetch_bars(symbol, timeframe.minutes(), from, to) {
            Ok(bars) => Some(bars),
            Err(e) => {
                warn!(symbol = %symbol, %timeframe, error = %e, "native series unavailable");
                None
            }
        }
    }

    /// Only completions on the current trading date may alert
    fn is_fresh(&self, event: &PatternEvent, today: NaiveDate) -> bool {
        event
            .completing_bar()
            .and_then(|c| self.clock.local_date(c.bar.start_millis))
            == Some(today)
    }

    fn handle_event(
        &self,
        symbol: &str,
        event: &PatternEvent,
        bars: &[Bar],
        now: DateTime<Utc>,
        today: NaiveDate,
        summary: &mut SymbolSummary,
    ) {
        let trailing = event
            .completing_bar()
            .and_then(|c| bars.iter().position(|b| b.start_millis == c.bar.start_millis))
            .map_or(bars, |idx| &bars[..=idx]);
        let confidence = self.scorer.score(
            event.pattern,
            event,
            trailing,
            self.clock.hour_of_day(now),
        );

        match self.gate.admits(event.pattern, confidence, self.clock.time_of_day(now)) {
            GateDecision::Eligible => {}
            decision => {
                debug!(symbol = %symbol, pattern = %event.pattern, ?decision, confidence = confidence.get(), "gated out");
                summary.gated_out += 1;
                return;
            }
        }

        let alert = Alert::from_event(symbol, event, confidence, today);
        let key = AlertKey::new(symbol, event.pattern, today);
        match self.dedup.deliver_once(&key, &alert, &self.sink, &self.store) {
            Ok(DeliveryOutcome::Sent) => summary.sent.push(alert),
            Ok(DeliveryOutcome::Suppressed) => summary.suppressed += 1,
            Ok(DeliveryOutcome::Failed(_)) => summary.delivery_failures += 1,
            Err(error) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %symbol, pattern = %event.pattern, %error, "dedup check failed");
                summary.store_failures += 1;
            }
        }
    }
}
