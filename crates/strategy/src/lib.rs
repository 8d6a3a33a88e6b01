//! Pure signal logic: indicators, crossover location, the timeframe ladder
//! and the trade levels attached to its pick. Nothing here performs I/O.

pub mod config;
pub mod confirmation;
pub mod crossover;
pub mod early_exit;
pub mod freshness;
pub mod indicators;
pub mod ladder;
pub mod levels;
pub mod setup;
pub mod signal;

pub use confirmation::confirm;
pub use config::{FallbackPolicy, FreshnessWindow, IndicatorParams, SetupParams, SignalConfig};
pub use crossover::{crossovers, locate_cross, trend_at};
pub use freshness::classify;
pub use indicators::{compute_indicators, IndicatorSeries};
pub use ladder::{read_trend, run_ladder, Ladder, LadderOutcome};
pub use signal::build_result;
