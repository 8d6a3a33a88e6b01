use common::{Freshness, TrendReading};

use crate::config::{FallbackPolicy, FreshnessWindow};

/// Classify a crossover age against the freshness window.
pub fn classify(bars_ago: Option<usize>, window: &FreshnessWindow) -> Freshness {
    match bars_ago {
        None => Freshness::Mature,
        Some(n) if window.contains(n) => Freshness::Fresh,
        Some(_) => Freshness::Stale,
    }
}

impl FallbackPolicy {
    /// Whether a non-fresh reading may stand in when no timeframe is fresh.
    pub fn accepts(&self, reading: &TrendReading, window: &FreshnessWindow) -> bool {
        match (self, reading.freshness) {
            (_, Freshness::Fresh) => false,
            (FallbackPolicy::Strict, _) => false,
            (_, Freshness::Mature) => true,
            (FallbackPolicy::FirstExisting, Freshness::Stale) => {
                reading.bars_ago().is_some_and(|n| n > window.max_fresh)
            }
            (FallbackPolicy::MatureOnly, Freshness::Stale) => false,
        }
    }
}
