//! Stop-loss and take-profit levels for a selected trend.

use tracing::debug;

use common::{
    Bar, Direction, IndicatorPoint, StopBasis, StopLoss, TakeProfit, TakeProfitSource, Timeframe,
    TrendReading,
};

use crate::crossover::crossovers;

/// Bars on each side a fractal pivot must dominate.
const PIVOT_WING: usize = 2;

/// Protective stop a fixed fraction beyond the crossover price. Trends with no
/// crossover in range are measured from the current long average instead.
pub fn stop_loss(reading: &TrendReading, buffer: f64) -> StopLoss {
    let (reference, basis) = match reading.crossover {
        Some(cross) => (cross.price, StopBasis::Crossover),
        None => (reading.long_avg, StopBasis::LongAverage),
    };
    let price = match reading.direction {
        Direction::Upward => reference * (1.0 - buffer),
        Direction::Downward => reference * (1.0 + buffer),
    };
    StopLoss {
        price,
        reference,
        basis,
    }
}

/// Newest opposing crossover whose price lies beyond `current` in the trade's
/// favor. The flag is set when a nearer opposing cross had to be skipped.
pub fn opposing_cross_target(
    points: &[IndicatorPoint],
    direction: Direction,
    current: f64,
) -> Option<(f64, usize, bool)> {
    crossovers(points, direction.opposite())
        .enumerate()
        .find(|(_, cross)| direction.favors(cross.price, current))
        .map(|(skipped, cross)| (cross.price, cross.bars_ago, skipped > 0))
}

/// Fractal highs (Upward) or lows (Downward): bars whose extreme strictly
/// dominates the two bars on either side. Oldest first.
pub fn fractal_pivots(bars: &[Bar], direction: Direction) -> Vec<f64> {
    let extreme = |b: &Bar| match direction {
        Direction::Upward => b.high,
        Direction::Downward => b.low,
    };
    if bars.len() < 2 * PIVOT_WING + 1 {
        return Vec::new();
    }
    (PIVOT_WING..bars.len() - PIVOT_WING)
        .filter_map(|i| {
            let v = extreme(&bars[i]);
            let dominates = bars[i - PIVOT_WING..i]
                .iter()
                .chain(&bars[i + 1..=i + PIVOT_WING])
                .all(|b| match direction {
                    Direction::Upward => v > b.high,
                    Direction::Downward => v < b.low,
                });
            dominates.then_some(v)
        })
        .collect()
}

/// Pivot nearest in price beyond `current` in the trade's favor.
pub fn pivot_target(bars: &[Bar], direction: Direction, current: f64) -> Option<f64> {
    let beyond = fractal_pivots(bars, direction)
        .into_iter()
        .filter(|&p| direction.favors(p, current));
    match direction {
        Direction::Upward => beyond.min_by(f64::total_cmp),
        Direction::Downward => beyond.max_by(f64::total_cmp),
    }
}

/// Take-profit by priority: opposing crossover, structural pivot on
/// `pivot_source`, then the open-ended extreme.
pub fn take_profit(
    reading: &TrendReading,
    points: &[IndicatorPoint],
    pivot_source: (Timeframe, &[Bar]),
) -> TakeProfit {
    let (direction, current) = (reading.direction, reading.current_price);

    if let Some((price, bars_ago, deep_search)) = opposing_cross_target(points, direction, current) {
        if deep_search {
            debug!(timeframe = %reading.timeframe, bars_ago, "Take-profit from deep crossover search");
        }
        return TakeProfit {
            price: Some(price),
            source: TakeProfitSource::OpposingCross {
                bars_ago,
                deep_search,
            },
        };
    }

    let (pivot_tf, bars) = pivot_source;
    if let Some(price) = pivot_target(bars, direction, current) {
        return TakeProfit {
            price: Some(price),
            source: TakeProfitSource::Pivot {
                timeframe: pivot_tf,
            },
        };
    }

    TakeProfit {
        price: None,
        source: TakeProfitSource::AllTimeExtreme { direction },
    }
}
