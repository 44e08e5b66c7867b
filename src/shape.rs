//! Bar shape classification
//!
//! Each bar is labelled relative to exactly one previous bar:
//!
//! | Shape | Label | Rule |
//! |---|---|---|
//! | [`Shape::Inside`] | `1` | neither extreme broken, or one broken with an unchanged close |
//! | [`Shape::Up`] | `2U` | one extreme broken, close above the previous close |
//! | [`Shape::Down`] | `2D` | one extreme broken, close below the previous close |
//! | [`Shape::Outside`] | `3` | both extremes broken |
//!
//! When exactly one side breaks, the close decides the label, not the side that broke.

use std::fmt;

use tracing::warn;

use crate::{Bar, Direction, OHLCVExt, Result, OHLCV};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Shape {
    Inside,
    Up,
    Down,
    Outside,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::Inside => "1",
            Shape::Up => "2U",
            Shape::Down => "2D",
            Shape::Outside => "3",
        }
    }

    #[inline]
    pub fn is_directional(self) -> bool {
        matches!(self, Shape::Up | Shape::Down)
    }

    /// `Up` <-> `Down`; None for non-directional shapes
    pub fn opposite(self) -> Option<Shape> {
        match self {
            Shape::Up => Some(Shape::Down),
            Shape::Down => Some(Shape::Up),
            Shape::Inside | Shape::Outside => None,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Shape::Up => Some(Direction::Bullish),
            Shape::Down => Some(Direction::Bearish),
            Shape::Inside | Shape::Outside => None,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bar and its shape relative to the bar that started at `prev_start_millis`
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClassifiedBar {
    pub bar: Bar,
    pub shape: Shape,
    pub prev_start_millis: i64,
}

impl ClassifiedBar {
    /// True if this bar was classified against `prev`
    #[inline]
    pub fn follows(&self, prev: &ClassifiedBar) -> bool {
        self.prev_start_millis == prev.bar.start_millis
    }
}

/// Classify `curr` against `prev`.
///
/// Fails with [`crate::StratError::InvalidBar`] (index 0 for `curr`, 1 for `prev`) if either
/// bar violates the OHLC invariant.
pub fn classify<T: OHLCV>(curr: &T, prev: &T) -> Result<Shape> {
    curr.validate_at(0)?;
    prev.validate_at(1)?;

    let broke_high = curr.high() > prev.high();
    let broke_low = curr.low() < prev.low();

    let shape = match (broke_high, broke_low) {
        (true, true) => Shape::Outside,
        (false, false) => Shape::Inside,
        _ => {
            if curr.close() > prev.close() {
                Shape::Up
            } else if curr.close() < prev.close() {
                Shape::Down
            } else {
                Shape::Inside
            }
        }
    };
    Ok(shape)
}

/// Classify bar `i` against bar `i - 1` over a time-ordered series.
///
/// Invalid bars are dropped before pairing, so they never break the surrounding sequence.
/// N valid bars yield N - 1 classified bars.
pub fn classify_series(bars: &[Bar]) -> Vec<ClassifiedBar> {
    let valid: Vec<&Bar> = bars
        .iter()
        .enumerate()
        .filter_map(|(i, bar)| match bar.validate_at(i) {
            Ok(()) => Some(bar),
            Err(error) => {
                warn!(start_millis = bar.start_millis, %error, "dropping invalid bar");
                None
            }
        })
        .collect();

    valid
        .windows(2)
        .filter_map(|pair| {
            let (prev, curr) = (pair[0], pair[1]);
            classify(curr, prev).ok().map(|shape| ClassifiedBar {
                bar: *curr,
                shape,
                prev_start_millis: prev.start_millis,
            })
        })
        .collect()
}
