//! Alert payloads handed to the messaging sink

use std::fmt;

use chrono::NaiveDate;

use crate::{
    compose::Timeframe, Confidence, Direction, PatternEvent, PatternType, Stage, TradeLevels,
};

/// A scored, gated detection ready for delivery
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Alert {
    pub symbol: String,
    pub pattern: PatternType,
    pub timeframe: Timeframe,
    pub stage: Stage,
    pub direction: Option<Direction>,
    pub entry: f64,
    pub levels: Option<TradeLevels>,
    pub confidence: Confidence,
    pub trading_date: NaiveDate,
    pub anchor_millis: i64,
}

impl Alert {
    pub fn from_event(
        symbol: &str,
        event: &PatternEvent,
        confidence: Confidence,
        trading_date: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            pattern: event.pattern,
            timeframe: event.pattern.timeframe(),
            stage: event.stage,
            direction: event.direction,
            entry: event.entry,
            levels: event.levels,
            confidence,
            trading_date,
            anchor_millis: event.anchor_millis,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} {} ({})",
            self.symbol, self.pattern, self.timeframe, self.trading_date
        )?;
        match (self.stage, self.direction) {
            (Stage::Pending, _) | (_, None) => writeln!(f, "Setup complete, awaiting direction")?,
            (Stage::Confirmed, Some(direction)) => {
                writeln!(f, "{} -> {}", direction, direction.option_side())?
            }
        }
        writeln!(f, "Entry: {:.2}", self.entry)?;
        if let Some(levels) = self.levels {
            writeln!(f, "Stop: {:.2}", levels.stop)?;
            writeln!(f, "Target: {:.2}", levels.target)?;
        }
        write!(f, "Confidence: {:.0}%", self.confidence.get() * 100.0)
    }
}
