//! 30-minute confirmation of a trend picked on a higher timeframe.
//!
//! Tiers are tried strongest first: a reclaim of the long average, full
//! alignment, then bare higher-high/higher-low structure.

use common::{Bar, Confirmation, Direction, IndicatorPoint, Setup};

use crate::config::SignalConfig;
use crate::crossover::trend_at;
use crate::indicators::IndicatorSeries;
use crate::setup::classify_setup;

/// Points inspected for a reclaim of the long average.
const REVERSAL_LOOKBACK: usize = 48;
const REVERSAL_MIN_POINTS: usize = 50;
/// Bars compared half against half for early trend structure.
const EARLY_TREND_LOOKBACK: usize = 24;

/// Grade `intraday` against a trade in `direction`. `None` means no 30m
/// series was available below the chosen timeframe.
pub fn confirm(
    direction: Direction,
    intraday: Option<&IndicatorSeries>,
    cfg: &SignalConfig,
) -> Confirmation {
    let Some(series) = intraday else {
        return Confirmation::Unavailable;
    };
    if reclaimed_long_average(&series.points, direction) {
        return Confirmation::Reversal;
    }
    if aligned(&series.points, direction, cfg) {
        return Confirmation::Alignment;
    }
    if early_trend(&series.bars, direction) {
        return Confirmation::EarlyTrend;
    }
    Confirmation::Fail
}

/// Traded through the long average inside the lookback, then built structure
/// back across it.
fn reclaimed_long_average(points: &[IndicatorPoint], direction: Direction) -> bool {
    if points.len() < REVERSAL_MIN_POINTS {
        return false;
    }
    let recent = &points[points.len() - REVERSAL_LOOKBACK..];
    let (prior_half, recent_half) = recent.split_at(REVERSAL_LOOKBACK / 2);
    let Some(latest) = recent.last() else {
        return false;
    };

    let crossed = recent.iter().any(|p| match direction {
        Direction::Upward => p.low < p.long_avg,
        Direction::Downward => p.high > p.long_avg,
    });
    let structure = making_structure(
        prior_half.iter().map(|p| (p.high, p.low)),
        recent_half.iter().map(|p| (p.high, p.low)),
        direction,
    );
    let reclaimed = match direction {
        Direction::Upward => max(recent_half.iter().map(|p| p.high)) >= latest.long_avg,
        Direction::Downward => min(recent_half.iter().map(|p| p.low)) <= latest.long_avg,
    };
    crossed && structure && reclaimed
}

fn aligned(points: &[IndicatorPoint], direction: Direction, cfg: &SignalConfig) -> bool {
    let Some(latest) = points.last() else {
        return false;
    };
    trend_at(latest, cfg.neutral_tolerance) == Some(direction)
        && classify_setup(points, direction, &cfg.setup) != Setup::Crossover
}

fn early_trend(bars: &[Bar], direction: Direction) -> bool {
    if bars.len() < EARLY_TREND_LOOKBACK {
        return false;
    }
    let recent = &bars[bars.len() - EARLY_TREND_LOOKBACK..];
    let (prior_half, recent_half) = recent.split_at(EARLY_TREND_LOOKBACK / 2);
    making_structure(
        prior_half.iter().map(|b| (b.high, b.low)),
        recent_half.iter().map(|b| (b.high, b.low)),
        direction,
    )
}

/// Higher high and higher low for an uptrend, lower low and lower high for a
/// downtrend, comparing the recent half's extremes with the prior half's.
fn making_structure(
    prior: impl Iterator<Item = (f64, f64)> + Clone,
    recent: impl Iterator<Item = (f64, f64)> + Clone,
    direction: Direction,
) -> bool {
    let (prior_high, prior_low) = (max(prior.clone().map(|x| x.0)), min(prior.map(|x| x.1)));
    let (recent_high, recent_low) = (max(recent.clone().map(|x| x.0)), min(recent.map(|x| x.1)));
    match direction {
        Direction::Upward => recent_high > prior_high && recent_low > prior_low,
        Direction::Downward => recent_low < prior_low && recent_high < prior_high,
    }
}

fn max(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}

fn min(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::INFINITY, f64::min)
}
