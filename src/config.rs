//! Scanner configuration: TOML parsing, defaults and validation.
//!
//! Every field has a default, so an empty document is a valid configuration. The watchlist is
//! normalized on load: symbols are trimmed, upper-cased and de-duplicated preserving order.
//!
//! ```toml
//! timezone = "America/New_York"
//! watchlist = ["SPY", "QQQ"]
//! max_concurrency = 4
//!
//! [windows]
//! reversal_22 = [{ start = "08:00", end = "08:30" }]
//! ```

use std::collections::HashSet;
use std::path::Path;

use chrono_tz::Tz;

use crate::{
    clock::SessionClock,
    gate::{AlertGate, AlertWindows},
    Result, StratError,
};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerConfig {
    /// IANA zone for all wall-clock logic
    pub timezone: Tz,
    pub watchlist: Vec<String>,
    /// Ceiling of concurrent per-symbol scans
    pub max_concurrency: usize,
    /// Calendar days of base history requested per scan
    pub lookback_days: u32,
    pub base_granularity_minutes: u32,
    /// Try natively fetched 4h/12h series before composing
    pub use_native_coarse: bool,
    pub alignment_tolerance_minutes: u32,
    pub min_confidence: f64,
    pub windows: AlertWindows,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            watchlist: Vec::new(),
            max_concurrency: 4,
            lookback_days: 10,
            base_granularity_minutes: 60,
            use_native_coarse: false,
            alignment_tolerance_minutes: 5,
            min_confidence: 0.50,
            windows: AlertWindows::default(),
        }
    }
}

impl ScannerConfig {
    /// Parse, normalize and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(raw).map_err(|e| StratError::InvalidConfig(e.to_string()))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StratError::InvalidConfig(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn with_watchlist<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.watchlist = symbols.into_iter().map(Into::into).collect();
        self.normalize();
        self
    }

    fn normalize(&mut self) {
        let mut seen = HashSet::new();
        let symbols = std::mem::take(&mut self.watchlist);
        self.watchlist = symbols
            .into_iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(StratError::InvalidConfig(
                "max_concurrency must be at least 1".into(),
            ));
        }
        if self.base_granularity_minutes == 0 || 60 % self.base_granularity_minutes != 0 {
            return Err(StratError::InvalidConfig(format!(
                "base_granularity_minutes must divide an hour, got {}",
                self.base_granularity_minutes
            )));
        }
        if self.lookback_days == 0 {
            return Err(StratError::InvalidConfig(
                "lookback_days must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(StratError::OutOfRange {
                field: "min_confidence",
                value: self.min_confidence,
                min: 0.0,
                max: 1.0,
            });
        }
        self.windows.validate()
    }

    pub fn clock(&self) -> SessionClock {
        SessionClock::new(self.timezone)
    }

    pub fn gate(&self) -> AlertGate {
        AlertGate::new(self.windows.clone(), self.min_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AlertWindow;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ScannerConfig::from_toml_str("").unwrap();
        assert_eq!(config, ScannerConfig::default());
        assert_eq!(config.timezone, chrono_tz::America::New_York);
        assert_eq!(config.max_concurrency, 4);
    }

    #[test]
    fn test_full_document() {
        let config = ScannerConfig::from_toml_str(
            r#"
            timezone = "Europe/London"
            watchlist = [" spy", "QQQ", "SPY", ""]
            max_concurrency = 2
            use_native_coarse = true

            [windows]
            miyagi = [{ start = "19:00", end = "19:45" }]
            "#,
        )
        .unwrap();
        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.watchlist, vec!["SPY", "QQQ"]);
        assert_eq!(config.max_concurrency, 2);
        assert!(config.use_native_coarse);
        assert_eq!(
            config.windows.miyagi,
            vec![AlertWindow::hm((19, 0), (19, 45)).unwrap()]
        );
        assert_eq!(config.windows.reversal_22, AlertWindows::default().reversal_22);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(ScannerConfig::from_toml_str("max_concurrency = 0").is_err());
        assert!(ScannerConfig::from_toml_str("base_granularity_minutes = 0").is_err());
        assert!(ScannerConfig::from_toml_str("base_granularity_minutes = 45").is_err());
        assert!(ScannerConfig::from_toml_str("base_granularity_minutes = 15").is_ok());
        assert!(ScannerConfig::from_toml_str("min_confidence = 1.5").is_err());
        assert!(ScannerConfig::from_toml_str("timezone = \"Mars/Olympus\"").is_err());
        assert!(ScannerConfig::from_toml_str("unknown_field = 1").is_err());
        assert!(ScannerConfig::from_toml_str(
            "[windows]\nreversal_322 = [{ start = \"11:00\", end = \"10:00\" }]"
        )
        .is_err());
    }

    #[test]
    fn test_gate_from_config() {
        let config = ScannerConfig {
            min_confidence: 0.7,
            ..ScannerConfig::default()
        };
        assert_eq!(config.gate().min_confidence, 0.7);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ScannerConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, StratError::InvalidConfig(_)));
    }
}
