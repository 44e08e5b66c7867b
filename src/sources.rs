//! Collaborator contracts: market data, alert delivery and alert persistence
//!
//! The core owns no wire or file formats. Implementors enforce their own timeouts; the core
//! never retries a failed call.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;

use crate::{alert::Alert, compose::Timeframe, gate::AlertKey, Bar, PatternEvent};

// ============================================================
// ERRORS
// ============================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("request timed out after {0}s")]
    Timeout(u64),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DeliveryError {
    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("rate limited, retry after {0}s")]
    RateLimited(u64),

    #[error("invalid sink configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("write rejected: {0}")]
    Rejected(String),
}

// ============================================================
// TRAITS
// ============================================================

/// Source of OHLCV bars
pub trait MarketData: Send + Sync {
    /// Bars of `granularity_minutes` between `from` and `to` inclusive, ascending by start.
    ///
    /// May return fewer bars than requested; callers treat short results as insufficient data.
    fn fetch_bars(
        &self,
        symbol: &str,
        granularity_minutes: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError>;
}

/// Messaging endpoint. At-most-once: a failure is reported, never retried by the core.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError>;
}

/// Persistent alert history; the existence of an [`AlertKey`] is the only dedup signal
pub trait AlertStore: Send + Sync {
    fn exists_alert(&self, key: &AlertKey) -> Result<bool, StoreError>;

    fn record_alert(&self, key: &AlertKey, alert: &Alert) -> Result<(), StoreError>;

    /// Optional audit trail of the bars a scan worked on
    fn save_bars(&self, _symbol: &str, _timeframe: Timeframe, _bars: &[Bar]) -> Result<(), StoreError> {
        Ok(())
    }

    /// Optional audit trail of detected patterns, alerted or not
    fn save_pattern(&self, _symbol: &str, _event: &PatternEvent) -> Result<(), StoreError> {
        Ok(())
    }
}

impl<T: MarketData + ?Sized> MarketData for Arc<T> {
    fn fetch_bars(
        &self,
        symbol: &str,
        granularity_minutes: u32,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Bar>, FetchError> {
        (**self).fetch_bars(symbol, granularity_minutes, from, to)
    }
}

impl<T: AlertSink + ?Sized> AlertSink for Arc<T> {
    fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        (**self).deliver(alert)
    }
}

impl<T: AlertStore + ?Sized> AlertStore for Arc<T> {
    fn exists_alert(&self, key: &AlertKey) -> Result<bool, StoreError> {
        (**self).exists_alert(key)
    }

    fn record_alert(&self, key: &AlertKey, alert: &Alert) -> Result<(), StoreError> {
        (**self).record_alert(key, alert)
    }

    fn save_bars(&self, symbol: &str, timeframe: Timeframe, bars: &[Bar]) -> Result<(), StoreError> {
        (**self).save_bars(symbol, timeframe, bars)
    }

    fn save_pattern(&self, symbol: &str, event: &PatternEvent) -> Result<(), StoreError> {
        (**self).save_pattern(symbol, event)
    }
}

// ============================================================
// IN-MEMORY STORE
// ============================================================

/// Mutex-guarded [`AlertStore`] for tests and single-process deployments
#[derive(Debug, Default)]
pub struct MemoryStore {
    alerts: Mutex<HashMap<AlertKey, Alert>>,
    patterns: Mutex<Vec<(String, PatternEvent)>>,
    record_calls: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `record_alert` calls so far
    pub fn record_calls(&self) -> usize {
        *self.record_calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn alerts(&self) -> Vec<Alert> {
        let alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<Alert> = alerts.values().cloned().collect();
        out.sort_by(|a, b| (&a.symbol, a.pattern).cmp(&(&b.symbol, b.pattern)));
        out
    }

    pub fn saved_patterns(&self) -> usize {
        self.patterns.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl AlertStore for MemoryStore {
    fn exists_alert(&self, key: &AlertKey) -> Result<bool, StoreError> {
        Ok(self
            .alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }

    fn record_alert(&self, key: &AlertKey, alert: &Alert) -> Result<(), StoreError> {
        *self.record_calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), alert.clone());
        Ok(())
    }

    fn save_pattern(&self, symbol: &str, event: &PatternEvent) -> Result<(), StoreError> {
        self.patterns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((symbol.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Confidence, PatternType, Stage};

    fn key(symbol: &str) -> AlertKey {
        AlertKey {
            symbol: symbol.to_string(),
            pattern: PatternType::Reversal22,
            timeframe: Timeframe::Hours4,
            trading_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        }
    }

    fn alert(symbol: &str) -> Alert {
        Alert {
            symbol: symbol.to_string(),
            pattern: PatternType::Reversal22,
            timeframe: Timeframe::Hours4,
            stage: Stage::Confirmed,
            direction: None,
            entry: 1.0,
            levels: None,
            confidence: Confidence::clamped(0.6),
            trading_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            anchor_millis: 0,
        }
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(!store.exists_alert(&key("SPY")).unwrap());
        store.record_alert(&key("SPY"), &alert("SPY")).unwrap();
        assert!(store.exists_alert(&key("SPY")).unwrap());
        assert!(!store.exists_alert(&key("QQQ")).unwrap());
        assert_eq!(store.record_calls(), 1);
        assert_eq!(store.alerts().len(), 1);
    }

    #[test]
    fn test_arc_forwarding() {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<MemoryStore> = Arc::clone(&store);
        shared.record_alert(&key("SPY"), &alert("SPY")).unwrap();
        assert!(store.exists_alert(&key("SPY")).unwrap());
    }
}
