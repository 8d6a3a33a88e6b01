//! Volatility setup annotation for the selected timeframe.
//!
//! A squeeze is a band width below a low quantile of its recent history.
//! The setup never changes the signal label.

use common::{Direction, IndicatorPoint, Setup};

use crate::config::SetupParams;

/// Classify the newest point of `points` for a trade in `direction`.
pub fn classify_setup(points: &[IndicatorPoint], direction: Direction, params: &SetupParams) -> Setup {
    let n = points.len();
    if n < 2 || params.squeeze_lookback < 2 || n < params.squeeze_lookback {
        return Setup::Crossover;
    }
    let history: Vec<f64> = points[n - params.squeeze_lookback..n - 1]
        .iter()
        .map(|p| p.band_width)
        .collect();
    let Some(threshold) = quantile(&history, params.squeeze_percentile) else {
        return Setup::Crossover;
    };

    let latest = &points[n - 1];
    let previous = &points[n - 2];
    let squeeze_now = latest.band_width < threshold;
    let squeeze_prev = previous.band_width < threshold;

    if squeeze_prev && !squeeze_now {
        let outside = match direction {
            Direction::Upward => latest.close > latest.band_upper,
            Direction::Downward => latest.close < latest.band_lower,
        };
        if outside {
            return Setup::Breakout;
        }
    }

    if squeeze_now {
        let trend_slope = trend_slope_agrees(points, direction, params);
        let pullback = pulled_back(points, direction, params);
        if trend_slope || pullback {
            return Setup::Consolidation {
                trend_slope,
                pullback,
            };
        }
    }

    Setup::Crossover
}

/// Lows rising for an uptrend, highs falling for a downtrend, over the
/// points preceding the newest.
fn trend_slope_agrees(points: &[IndicatorPoint], direction: Direction, params: &SetupParams) -> bool {
    let n = points.len();
    let Some(window) = points.get(n.saturating_sub(params.slope_lookback)..n.saturating_sub(1)) else {
        return false;
    };
    let ys: Vec<f64> = window
        .iter()
        .map(|p| match direction {
            Direction::Upward => p.low,
            Direction::Downward => p.high,
        })
        .collect();
    match linear_slope(&ys) {
        Some(slope) => direction.favors(slope, 0.0),
        None => false,
    }
}

/// Band middle back near the long average after an earlier excursion beyond
/// it that also outran the latest close.
fn pulled_back(points: &[IndicatorPoint], direction: Direction, params: &SetupParams) -> bool {
    let n = points.len();
    let latest = &points[n - 1];
    if latest.long_avg == 0.0
        || (latest.band_middle - latest.long_avg).abs() / latest.long_avg.abs()
            >= params.pullback_tolerance
    {
        return false;
    }
    let (Some(start), Some(end)) = (
        n.checked_sub(params.pullback_window_start),
        n.checked_sub(params.pullback_window_end),
    ) else {
        return false;
    };
    let Some(past) = points.get(start..end) else {
        return false;
    };
    let past = past.iter().map(|p| p.close);
    let extreme = match direction {
        Direction::Upward => past.max_by(f64::total_cmp),
        Direction::Downward => past.min_by(f64::total_cmp),
    };
    extreme.is_some_and(|x| direction.favors(x, latest.long_avg) && direction.favors(x, latest.close))
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Least-squares slope of `ys` against 0, 1, 2, ...
fn linear_slope(ys: &[f64]) -> Option<f64> {
    if ys.len() < 2 {
        return None;
    }
    let n = ys.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = ys.iter().sum::<f64>() / n;
    let (num, den) = ys.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - x_mean;
        (num + dx * (y - y_mean), den + dx * dx)
    });
    Some(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::test_support::points_from;

    fn widths(points: &mut [IndicatorPoint]) {
        for (i, p) in points.iter_mut().enumerate() {
            p.band_width = 0.05 + (i % 10) as f64 * 0.001;
        }
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let q = quantile(&[5.0, 1.0, 3.0, 2.0, 4.0], 0.2).unwrap();
        assert!((q - 1.8).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.2), Some(7.0));
        assert_eq!(quantile(&[], 0.2), None);
    }

    #[test]
    fn slope_of_line_is_exact() {
        let ys: Vec<f64> = (0..10).map(|i| 3.0 + 0.5 * i as f64).collect();
        assert!((linear_slope(&ys).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn short_history_is_crossover() {
        let pts = points_from(&[101.0; 50], &[100.0; 50]);
        assert_eq!(
            classify_setup(&pts, Direction::Upward, &SetupParams::default()),
            Setup::Crossover
        );
    }

    #[test]
    fn squeeze_release_beyond_band_is_breakout() {
        let mut pts = points_from(&[101.0; 130], &[100.0; 130]);
        widths(&mut pts);
        pts[128].band_width = 0.01;
        pts[129].band_width = 0.2;
        pts[129].close = 104.0;

        let setup = classify_setup(&pts, Direction::Upward, &SetupParams::default());
        assert_eq!(setup, Setup::Breakout);

        // same widths but the close stays inside the band
        pts[129].close = 102.0;
        let setup = classify_setup(&pts, Direction::Upward, &SetupParams::default());
        assert_eq!(setup, Setup::Crossover);
    }

    #[test]
    fn squeeze_with_rising_lows_is_consolidation() {
        let middle: Vec<f64> = (0..130).map(|i| 100.0 + i as f64 * 0.01).collect();
        let mut pts = points_from(&middle, &[90.0; 130]);
        widths(&mut pts);
        pts[129].band_width = 0.01;

        let setup = classify_setup(&pts, Direction::Upward, &SetupParams::default());
        assert_eq!(
            setup,
            Setup::Consolidation {
                trend_slope: true,
                pullback: false
            }
        );
        assert_eq!(setup.to_string(), "Consolidation (Trend Slope)");
    }

    #[test]
    fn squeeze_near_long_average_after_rally_is_pullback() {
        let mut pts = points_from(&[101.0; 130], &[100.0; 130]);
        widths(&mut pts);
        for (i, p) in pts.iter_mut().enumerate() {
            p.low -= i as f64 * 0.001;
        }
        pts[129].band_width = 0.01;
        // rally inside [n - 80, n - 20)
        pts[70].close = 110.0;

        let setup = classify_setup(&pts, Direction::Upward, &SetupParams::default());
        assert_eq!(
            setup,
            Setup::Consolidation {
                trend_slope: false,
                pullback: true
            }
        );
    }

    #[test]
    fn downward_pullback_mirrors() {
        let mut pts = points_from(&[99.0; 130], &[100.0; 130]);
        widths(&mut pts);
        for (i, p) in pts.iter_mut().enumerate() {
            p.high += i as f64 * 0.001;
        }
        pts[129].band_width = 0.01;
        pts[70].close = 90.0;

        let setup = classify_setup(&pts, Direction::Downward, &SetupParams::default());
        assert_eq!(
            setup,
            Setup::Consolidation {
                trend_slope: false,
                pullback: true
            }
        );
    }

    #[test]
    fn degenerate_windows_never_index_out_of_range() {
        let mut pts = points_from(&[101.0; 130], &[100.0; 130]);
        widths(&mut pts);
        pts[129].band_width = 0.01;

        let no_history = SetupParams {
            squeeze_lookback: 0,
            ..SetupParams::default()
        };
        assert_eq!(classify_setup(&pts, Direction::Upward, &no_history), Setup::Crossover);

        // squeezed, but neither context window holds any points
        let empty_context = SetupParams {
            slope_lookback: 0,
            pullback_window_start: 0,
            pullback_window_end: 0,
            ..SetupParams::default()
        };
        assert_eq!(classify_setup(&pts, Direction::Upward, &empty_context), Setup::Crossover);
    }

    #[test]
    fn no_squeeze_is_crossover() {
        let mut pts = points_from(&[101.0; 130], &[100.0; 130]);
        widths(&mut pts);
        assert_eq!(
            classify_setup(&pts, Direction::Upward, &SetupParams::default()),
            Setup::Crossover
        );
    }
}
