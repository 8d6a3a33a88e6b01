pub mod bollinger;
pub mod ema;

pub use bollinger::{BandSeries, BollingerBands};
pub use ema::Ema;

use common::{Bar, Error, IndicatorPoint, Result};

use crate::config::IndicatorParams;

/// Raw bars for one (instrument, timeframe) plus the indicator points derived
/// from them. `points` covers only the suffix where every indicator is
/// defined, so `points.len() <= bars.len()` and the two align at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub bars: Vec<Bar>,
    pub points: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn newest(&self) -> Option<&IndicatorPoint> {
        self.points.last()
    }

    /// Close of the newest bar.
    pub fn current_price(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

/// Compute long average and bands for a bar series.
///
/// Rejects series shorter than `min_bars`, and series whose NaN gaps leave
/// undefined values after the warm-up trim.
pub fn compute_indicators(
    bars: Vec<Bar>,
    params: &IndicatorParams,
    min_bars: usize,
) -> Result<IndicatorSeries> {
    if bars.len() < min_bars {
        return Err(Error::InsufficientData(format!(
            "{} bars, need {min_bars}",
            bars.len()
        )));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let long = Ema::new(params.long_period).compute(&closes);
    let bands = BollingerBands::new(params.band_period, params.band_std_mult).compute(&closes);

    let start = params.long_period.max(params.band_period) - 1;
    let mut points = Vec::with_capacity(bars.len().saturating_sub(start));
    for (i, bar) in bars.iter().enumerate().skip(start) {
        let point = IndicatorPoint {
            timestamp: bar.timestamp,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            long_avg: long[i],
            band_middle: bands.middle[i],
            band_upper: bands.upper[i],
            band_lower: bands.lower[i],
            band_width: (bands.upper[i] - bands.lower[i]) / bands.middle[i],
        };
        if !(point.long_avg.is_finite() && point.band_middle.is_finite()) {
            return Err(Error::InsufficientData(format!(
                "undefined indicator value at {} after warm-up",
                bar.timestamp
            )));
        }
        points.push(point);
    }

    if points.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "{} usable indicator points, need 2",
            points.len()
        )));
    }

    Ok(IndicatorSeries { bars, points })
}
