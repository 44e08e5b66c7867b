//! Reversal pattern detectors
//!
//! Each detector consumes one classified sequence and emits [`crate::PatternEvent`]s.
//!
//! # Patterns
//!
//! - **1-3-1 "Miyagi"** (12h): inside, outside, inside; the next bar resolves direction.
//! - **3-2-2** (60m): outside at 08:00, directional at 09:00, opposite directional at 10:00.
//! - **2-2** (4h): directional at 04:00, opposite directional at 08:00 opening inside it.

pub mod helpers;

pub mod miyagi;
pub mod reversal_22;
pub mod reversal_322;

pub use helpers::*;
pub use miyagi::*;
pub use reversal_22::*;
pub use reversal_322::*;
