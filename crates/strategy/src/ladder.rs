//! Timeframe ladder: pick one signal across ascending timeframes.
//!
//! The first fresh timeframe wins outright. Otherwise the first timeframe the
//! fallback policy accepts is kept, which requires seeing every rung.

use std::ops::ControlFlow;

use tracing::debug;

use common::{Freshness, Result, Timeframe, TimeframeVerdict, TraceEntry, TrendReading};

use crate::config::SignalConfig;
use crate::crossover::{locate_cross, trend_at};
use crate::freshness::classify;
use crate::indicators::IndicatorSeries;

/// Trend reading for one timeframe, or `None` when the trend is neutral.
pub fn read_trend(
    timeframe: Timeframe,
    series: &IndicatorSeries,
    cfg: &SignalConfig,
) -> Option<TrendReading> {
    let newest = series.newest()?;
    let direction = trend_at(newest, cfg.neutral_tolerance)?;
    let crossover = locate_cross(&series.points, direction, cfg.search_depth);
    Some(TrendReading {
        timeframe,
        direction,
        crossover,
        freshness: classify(crossover.map(|c| c.bars_ago), &cfg.freshness),
        current_price: series.current_price()?,
        long_avg: newest.long_avg,
    })
}

/// Result of a full ladder pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LadderOutcome {
    pub selected: Option<TrendReading>,
    pub trace: Vec<TraceEntry>,
}

/// Single-pass ladder state. Feed timeframes in ascending order; stop
/// feeding once `observe` breaks.
#[derive(Debug)]
pub struct Ladder<'a> {
    cfg: &'a SignalConfig,
    fresh: Option<TrendReading>,
    fallback: Option<TrendReading>,
    trace: Vec<TraceEntry>,
}

impl<'a> Ladder<'a> {
    pub fn new(cfg: &'a SignalConfig) -> Self {
        Self {
            cfg,
            fresh: None,
            fallback: None,
            trace: Vec::with_capacity(cfg.ladder.len()),
        }
    }

    /// Record a timeframe whose data could not be obtained.
    pub fn observe_missing(&mut self, timeframe: Timeframe, reason: impl Into<String>) -> ControlFlow<()> {
        if self.fresh.is_some() {
            return ControlFlow::Break(());
        }
        let reason = reason.into();
        debug!(%timeframe, %reason, "Ladder: no data");
        self.trace.push(TraceEntry {
            timeframe,
            verdict: TimeframeVerdict::NoData { reason },
        });
        ControlFlow::Continue(())
    }

    /// Evaluate one timeframe. Breaks on the first fresh reading.
    pub fn observe(&mut self, timeframe: Timeframe, series: &IndicatorSeries) -> ControlFlow<()> {
        if self.fresh.is_some() {
            return ControlFlow::Break(());
        }

        let Some(reading) = read_trend(timeframe, series, self.cfg) else {
            debug!(%timeframe, "Ladder: neutral");
            self.trace.push(TraceEntry {
                timeframe,
                verdict: TimeframeVerdict::Neutral,
            });
            return ControlFlow::Continue(());
        };

        debug!(
            %timeframe,
            direction = %reading.direction,
            freshness = %reading.freshness,
            bars_ago = ?reading.bars_ago(),
            "Ladder: trend"
        );
        self.trace.push(TraceEntry {
            timeframe,
            verdict: TimeframeVerdict::Trend {
                direction: reading.direction,
                freshness: reading.freshness,
                bars_ago: reading.bars_ago(),
            },
        });

        if reading.freshness == Freshness::Fresh {
            self.fresh = Some(reading);
            return ControlFlow::Break(());
        }
        if self.fallback.is_none() && self.cfg.fallback.accepts(&reading, &self.cfg.freshness) {
            self.fallback = Some(reading);
        }
        ControlFlow::Continue(())
    }

    pub fn finish(self) -> LadderOutcome {
        LadderOutcome {
            selected: self.fresh.or(self.fallback),
            trace: self.trace,
        }
    }
}

/// Run the configured ladder synchronously, pulling each series from `fetch`.
/// Higher timeframes are not fetched once a fresh one is found.
pub fn run_ladder<F>(cfg: &SignalConfig, mut fetch: F) -> LadderOutcome
where
    F: FnMut(Timeframe) -> Result<IndicatorSeries>,
{
    let mut ladder = Ladder::new(cfg);
    for &timeframe in &cfg.ladder {
        let flow = match fetch(timeframe) {
            Ok(series) => ladder.observe(timeframe, &series),
            Err(e) => ladder.observe_missing(timeframe, e.to_string()),
        };
        if flow.is_break() {
            break;
        }
    }
    ladder.finish()
}
