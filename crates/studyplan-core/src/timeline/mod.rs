//! Availability and ranking.
//!
//! This module provides:
//! - Interval merging and free-gap detection per day
//! - Task prioritization by urgency and importance

mod gap;
mod priority;

pub use gap::{merge_intervals, subtract, AvailabilityResolver, Interval, TimeGap};
pub use priority::{prioritize, PriorityCalculator, PriorityWeights, RankedTask};
