use tracing::debug;

use common::{Direction, ExitWarning, Timeframe};

use crate::config::SignalConfig;
use crate::indicators::IndicatorSeries;
use crate::ladder::read_trend;

/// Warn about lower timeframes already trending against `direction`.
///
/// A lower timeframe counts when its trend is opposite and its own crossover
/// is at least `exit_min_bars` old, or lies beyond the search depth. Warnings
/// never veto a signal.
pub fn audit<'s>(
    direction: Direction,
    lower: impl IntoIterator<Item = (Timeframe, &'s IndicatorSeries)>,
    cfg: &SignalConfig,
) -> Vec<ExitWarning> {
    let mut warnings = Vec::new();
    for (timeframe, series) in lower {
        let Some(reading) = read_trend(timeframe, series, cfg) else {
            continue;
        };
        if reading.direction != direction.opposite() {
            continue;
        }
        let bars_ago = reading.bars_ago();
        if bars_ago.is_some_and(|n| n < cfg.exit_min_bars) {
            debug!(%timeframe, ?bars_ago, "Opposing cross too recent to warn");
            continue;
        }
        warnings.push(ExitWarning {
            timeframe,
            direction: reading.direction,
            bars_ago,
        });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::{neutral_series, trend_series};
    use common::format_warnings;

    #[test]
    fn flags_established_opposing_trends_only() {
        let cfg = SignalConfig::default();
        let h4 = trend_series(Direction::Downward, Some(12), 300);
        let h1 = trend_series(Direction::Downward, Some(1), 300);
        let m30 = trend_series(Direction::Upward, Some(20), 300);

        let warnings = audit(
            Direction::Upward,
            [(Timeframe::H4, &h4), (Timeframe::H1, &h1), (Timeframe::M30, &m30)],
            &cfg,
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].timeframe, Timeframe::H4);
        assert_eq!(format_warnings(&warnings), "4h DOWNTREND (12 bars)");
    }

    #[test]
    fn mature_opposing_trend_warns() {
        let cfg = SignalConfig::default();
        let d1 = trend_series(Direction::Upward, None, 300);
        let warnings = audit(Direction::Downward, [(Timeframe::D1, &d1)], &cfg);
        assert_eq!(format_warnings(&warnings), "1d UPTREND (mature)");
    }

    #[test]
    fn exit_min_bars_is_inclusive() {
        let cfg = SignalConfig::default();
        let h1 = trend_series(Direction::Downward, Some(cfg.exit_min_bars), 300);
        assert_eq!(audit(Direction::Upward, [(Timeframe::H1, &h1)], &cfg).len(), 1);
    }

    #[test]
    fn neutral_or_empty_audit_is_none() {
        let cfg = SignalConfig::default();
        let flat = neutral_series(300);
        assert!(audit(Direction::Upward, [(Timeframe::H1, &flat)], &cfg).is_empty());
        let none: Vec<(Timeframe, &IndicatorSeries)> = Vec::new();
        assert_eq!(format_warnings(&audit(Direction::Upward, none, &cfg)), "None");
    }
}
