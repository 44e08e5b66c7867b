//! Confidence scoring
//!
//! Starts from a per-pattern base score and adds independent adjustments for volume, extension
//! from the mean, pattern clarity (3-2-2 only), realized range and time of day. The sum is
//! clamped to `[0.40, 0.95]`.
//!
//! Adjustments that need trailing data contribute nothing when the window is empty.

use crate::{Bar, Confidence, OHLCVExt, PatternEvent, PatternType};

/// Scorer windows; [`Default`] matches the documented behavior
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    pub volume_period: usize,
    pub mean_period: usize,
    pub range_period: usize,
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self {
            volume_period: 20,
            mean_period: 10,
            range_period: 5,
        }
    }
}

impl ConfidenceScorer {
    pub fn base_score(pattern: PatternType) -> f64 {
        match pattern {
            PatternType::Reversal322 => 0.65,
            PatternType::Reversal22 => 0.60,
            PatternType::Miyagi => 0.70,
        }
    }

    /// Score `event` given the bars up to and including its completing bar.
    ///
    /// `evaluation_hour` is the local hour at which the score is taken.
    pub fn score(
        &self,
        pattern: PatternType,
        event: &PatternEvent,
        trailing: &[Bar],
        evaluation_hour: u32,
    ) -> Confidence {
        let raw = Self::base_score(pattern)
            + self.volume_adjustment(trailing)
            + self.extension_adjustment(trailing)
            + clarity_adjustment(pattern, event)
            + self.realized_range_adjustment(trailing)
            + time_of_day_adjustment(evaluation_hour);
        Confidence::clamped(raw)
    }

    /// Latest volume against the trailing mean (window includes the latest bar)
    pub fn volume_adjustment(&self, trailing: &[Bar]) -> f64 {
        let Some(latest) = trailing.last() else {
            return 0.0;
        };
        let window = tail(trailing, self.volume_period);
        let mean = window.iter().map(|b| b.volume).sum::<f64>() / window.len() as f64;
        let ratio = if mean > 0.0 { latest.volume / mean } else { 0.0 };

        if ratio > 2.0 {
            0.15
        } else if ratio > 1.5 {
            0.10
        } else if ratio > 1.0 {
            0.05
        } else {
            -0.05
        }
    }

    /// Distance of the latest close from the mean close, as a fraction of the mean
    pub fn extension_adjustment(&self, trailing: &[Bar]) -> f64 {
        let Some(latest) = trailing.last() else {
            return 0.0;
        };
        let window = tail(trailing, self.mean_period);
        let mean = window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64;
        if mean <= 0.0 {
            return 0.0;
        }
        let extension = (latest.close - mean).abs() / mean;

        if extension > 0.03 {
            0.10
        } else if extension > 0.02 {
            0.05
        } else {
            0.0
        }
    }

    /// Mean of `(high - low) / close` over the recent window
    pub fn realized_range_adjustment(&self, trailing: &[Bar]) -> f64 {
        let ranges: Vec<f64> = tail(trailing, self.range_period)
            .iter()
            .filter_map(|b| b.range_pct())
            .collect();
        if ranges.is_empty() {
            return 0.0;
        }
        let mean = ranges.iter().sum::<f64>() / ranges.len() as f64;

        if mean > 0.02 {
            0.05
        } else if mean < 0.005 {
            -0.05
        } else {
            0.0
        }
    }
}

/// Score with the default scorer
pub fn score(
    pattern: PatternType,
    event: &PatternEvent,
    trailing: &[Bar],
    evaluation_hour: u32,
) -> Confidence {
    ConfidenceScorer::default().score(pattern, event, trailing, evaluation_hour)
}

/// 3-2-2 only: outside-bar range against the first directional bar's range
fn clarity_adjustment(pattern: PatternType, event: &PatternEvent) -> f64 {
    if pattern != PatternType::Reversal322 {
        return 0.0;
    }
    let (Some(outside), Some(directional)) = (event.supporting.first(), event.supporting.get(1))
    else {
        return 0.0;
    };
    let outside_range = outside.bar.range();
    let directional_range = directional.bar.range();

    let clear = if directional_range > 0.0 {
        outside_range / directional_range > 1.5
    } else {
        outside_range > 0.0
    };
    if clear {
        0.10
    } else {
        0.05
    }
}

fn time_of_day_adjustment(hour: u32) -> f64 {
    match hour {
        9 | 10 | 15 | 16 => 0.05,
        11..=14 => 0.0,
        _ => -0.05,
    }
}

#[inline]
fn tail(bars: &[Bar], period: usize) -> &[Bar] {
    &bars[bars.len().saturating_sub(period.max(1))..]
}
