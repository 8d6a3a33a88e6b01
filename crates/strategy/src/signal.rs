use common::{Bar, Result, Timeframe, TimeframeResult, TrendReading};

use crate::config::SignalConfig;
use crate::confirmation::confirm;
use crate::early_exit::audit;
use crate::indicators::IndicatorSeries;
use crate::levels::{stop_loss, take_profit};
use crate::setup::classify_setup;

/// Attach trade levels, early-exit warnings, the setup and the 30m
/// confirmation to a ladder pick.
///
/// `pivot_source` is the next-higher timeframe's bars when available,
/// otherwise the selected series' own. `lower` holds the audit-set series
/// that could be loaded.
pub fn build_result<'s>(
    reading: TrendReading,
    series: &IndicatorSeries,
    pivot_source: (Timeframe, &[Bar]),
    lower: impl IntoIterator<Item = (Timeframe, &'s IndicatorSeries)>,
    cfg: &SignalConfig,
) -> Result<TimeframeResult> {
    let sl = stop_loss(&reading, cfg.stop_loss_buffer);
    let tp = take_profit(&reading, &series.points, pivot_source);
    let lower: Vec<(Timeframe, &IndicatorSeries)> = lower.into_iter().collect();
    let intraday = lower
        .iter()
        .find(|(tf, _)| *tf == Timeframe::M30)
        .map(|(_, s)| *s);
    let confirmation = confirm(reading.direction, intraday, cfg);
    let warnings = audit(reading.direction, lower.iter().copied(), cfg);
    let setup = classify_setup(&series.points, reading.direction, &cfg.setup);
    Ok(TimeframeResult::new(reading, sl, tp, warnings, setup)?.with_confirmation(confirmation))
}
