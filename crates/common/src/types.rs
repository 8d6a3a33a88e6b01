use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV candle. Series are ordered oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chart granularity. Ordering runs smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1wk")]
    W1,
    #[serde(rename = "1mo")]
    Mo1,
}

impl Timeframe {
    /// Every timeframe, ascending.
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1wk",
            Timeframe::Mo1 => "1mo",
        }
    }

    /// The timeframe whose structure is used for pivot targets.
    pub fn next_higher(self) -> Option<Timeframe> {
        let idx = Self::ALL.iter().position(|tf| *tf == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Strictly lower timeframes audited for early-exit warnings, largest first.
    pub fn audit_set(self) -> Vec<Timeframe> {
        Self::ALL.iter().rev().copied().filter(|tf| *tf < self).collect()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown timeframe '{s}'")))
    }
}

/// Side of a trend or crossover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upward,
    Downward,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Upward => Direction::Downward,
            Direction::Downward => Direction::Upward,
        }
    }

    /// `true` when `price` lies beyond `reference` in this direction's favor.
    pub fn favors(self, price: f64, reference: f64) -> bool {
        match self {
            Direction::Upward => price > reference,
            Direction::Downward => price < reference,
        }
    }

    pub fn trend_label(self) -> &'static str {
        match self {
            Direction::Upward => "UPTREND",
            Direction::Downward => "DOWNTREND",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upward => write!(f, "UP"),
            Direction::Downward => write!(f, "DOWN"),
        }
    }
}

/// Derived values for one bar, present only once the long average is defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub long_avg: f64,
    pub band_middle: f64,
    pub band_upper: f64,
    pub band_lower: f64,
    /// (upper - lower) / middle
    pub band_width: f64,
}

impl IndicatorPoint {
    /// Signed distance of the band middle above the long average.
    pub fn spread(&self) -> f64 {
        self.band_middle - self.long_avg
    }
}

/// A sign change of (band middle - long average) between two adjacent points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrossoverEvent {
    pub direction: Direction,
    /// Distance of the later bracketing point from the newest point.
    pub bars_ago: usize,
    /// Index of the later bracketing point in the indicator series.
    pub index: usize,
    /// Timestamp of the later bracketing point.
    pub timestamp: DateTime<Utc>,
    /// Intersection of the two indicator segments, never a raw bar price.
    pub price: f64,
}

/// How recent a trend's originating crossover is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    /// Crossover inside the freshness window: actionable.
    Fresh,
    /// Trend active but no crossover inside the search depth.
    Mature,
    /// Crossover outside the freshness window.
    Stale,
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Fresh => write!(f, "Fresh"),
            Freshness::Mature => write!(f, "Mature"),
            Freshness::Stale => write!(f, "Stale"),
        }
    }
}

/// Trend state of one timeframe as seen by the ladder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReading {
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub crossover: Option<CrossoverEvent>,
    pub freshness: Freshness,
    pub current_price: f64,
    /// Long average at the newest point.
    pub long_avg: f64,
}

impl TrendReading {
    pub fn bars_ago(&self) -> Option<usize> {
        self.crossover.map(|c| c.bars_ago)
    }
}

/// Outcome of evaluating one timeframe, kept for the diagnostic trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum TimeframeVerdict {
    NoData { reason: String },
    Neutral,
    Trend {
        direction: Direction,
        freshness: Freshness,
        bars_ago: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEntry {
    pub timeframe: Timeframe,
    pub verdict: TimeframeVerdict,
}

impl fmt::Display for TraceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.timeframe)?;
        match &self.verdict {
            TimeframeVerdict::NoData { reason } => write!(f, "No Data ({reason})"),
            TimeframeVerdict::Neutral => write!(f, "Neutral"),
            TimeframeVerdict::Trend {
                direction,
                freshness,
                bars_ago: Some(n),
            } => write!(f, "{direction} {freshness} ({n} bars)"),
            TimeframeVerdict::Trend {
                direction,
                freshness,
                bars_ago: None,
            } => write!(f, "{direction} {freshness} (no cross found)"),
        }
    }
}

/// Joins trace entries into the single audit string carried by results.
pub fn format_trace(trace: &[TraceEntry]) -> String {
    if trace.is_empty() {
        return "no timeframes checked".to_string();
    }
    trace
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// What a stop-loss was measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBasis {
    Crossover,
    /// Mature trends have no crossover; the current long average stands in.
    LongAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StopLoss {
    pub price: f64,
    pub reference: f64,
    pub basis: StopBasis,
}

/// Where a take-profit came from, in search priority order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum TakeProfitSource {
    OpposingCross { bars_ago: usize, deep_search: bool },
    Pivot { timeframe: Timeframe },
    AllTimeExtreme { direction: Direction },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TakeProfit {
    /// `None` only for `AllTimeExtreme`.
    pub price: Option<f64>,
    pub source: TakeProfitSource,
}

impl TakeProfit {
    /// Low-confidence targets: deep-searched crosses and open-ended extremes.
    pub fn is_cautionary(&self) -> bool {
        matches!(
            self.source,
            TakeProfitSource::OpposingCross { deep_search: true, .. }
                | TakeProfitSource::AllTimeExtreme { .. }
        )
    }
}

impl fmt::Display for TakeProfitSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TakeProfitSource::OpposingCross {
                bars_ago,
                deep_search: false,
            } => write!(f, "Opposing cross {bars_ago} bars ago"),
            TakeProfitSource::OpposingCross {
                bars_ago,
                deep_search: true,
            } => write!(f, "Opposing cross {bars_ago} bars ago (deep search, choppy market)"),
            TakeProfitSource::Pivot { timeframe } => write!(f, "{timeframe} structural pivot"),
            TakeProfitSource::AllTimeExtreme {
                direction: Direction::Upward,
            } => write!(f, "All-Time High (no target, caution)"),
            TakeProfitSource::AllTimeExtreme {
                direction: Direction::Downward,
            } => write!(f, "All-Time Low (no target, caution)"),
        }
    }
}

/// Volatility setup around the chosen timeframe's newest bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "setup", rename_all = "snake_case")]
pub enum Setup {
    Breakout,
    Consolidation { trend_slope: bool, pullback: bool },
    Crossover,
}

impl fmt::Display for Setup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setup::Breakout => write!(f, "Breakout"),
            Setup::Crossover => write!(f, "Crossover"),
            Setup::Consolidation {
                trend_slope,
                pullback,
            } => {
                let mut parts = Vec::new();
                if *trend_slope {
                    parts.push("Trend Slope");
                }
                if *pullback {
                    parts.push("Pullback to Long Average");
                }
                write!(f, "Consolidation ({})", parts.join(" & "))
            }
        }
    }
}

/// Grade of the 30-minute chart's agreement with the chosen trend, strongest
/// first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confirmation {
    /// Price dipped through the long average and reclaimed it with a
    /// higher-high/higher-low structure (mirrored for downtrends).
    Reversal,
    /// The 30m chart carries the same trend with a breakout or consolidation.
    Alignment,
    /// Higher highs and higher lows only (mirrored for downtrends).
    EarlyTrend,
    Fail,
    /// No 30m series below the chosen timeframe.
    #[default]
    Unavailable,
}

impl Confirmation {
    pub fn passed(self) -> bool {
        matches!(
            self,
            Confirmation::Reversal | Confirmation::Alignment | Confirmation::EarlyTrend
        )
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::Reversal => write!(f, "Pass (Reversal)"),
            Confirmation::Alignment => write!(f, "Pass (Alignment)"),
            Confirmation::EarlyTrend => write!(f, "Pass (Early Trend)"),
            Confirmation::Fail => write!(f, "Fail"),
            Confirmation::Unavailable => write!(f, "N/A"),
        }
    }
}

/// An established opposing trend on a lower timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExitWarning {
    pub timeframe: Timeframe,
    pub direction: Direction,
    /// `None` when the opposing trend predates the search depth.
    pub bars_ago: Option<usize>,
}

impl fmt::Display for ExitWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bars_ago {
            Some(n) => write!(f, "{} {} ({n} bars)", self.timeframe, self.direction.trend_label()),
            None => write!(f, "{} {} (mature)", self.timeframe, self.direction.trend_label()),
        }
    }
}

/// Joins warnings into the report string; `"None"` when there are none.
pub fn format_warnings(warnings: &[ExitWarning]) -> String {
    if warnings.is_empty() {
        return "None".to_string();
    }
    warnings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The signal chosen for one instrument, with its trade levels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeframeResult {
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub crossover: Option<CrossoverEvent>,
    pub freshness: Freshness,
    pub current_price: f64,
    pub stop_loss: StopLoss,
    pub take_profit: TakeProfit,
    pub early_exit: Vec<ExitWarning>,
    pub setup: Setup,
    pub confirmation: Confirmation,
}

impl TimeframeResult {
    /// Assemble a result, rejecting non-finite levels and stops placed on the
    /// wrong side of their reference price.
    pub fn new(
        reading: TrendReading,
        stop_loss: StopLoss,
        take_profit: TakeProfit,
        early_exit: Vec<ExitWarning>,
        setup: Setup,
    ) -> Result<Self> {
        if !reading.current_price.is_finite() || reading.current_price <= 0.0 {
            return Err(Error::InvalidResult(format!(
                "current price {} is not a positive finite number",
                reading.current_price
            )));
        }
        if !stop_loss.price.is_finite() {
            return Err(Error::InvalidResult("stop-loss is not finite".to_string()));
        }
        if reading.direction.favors(stop_loss.price, stop_loss.reference)
            || stop_loss.price == stop_loss.reference
        {
            return Err(Error::InvalidResult(format!(
                "stop-loss {:.4} is not protective for a {} trade from {:.4}",
                stop_loss.price,
                reading.direction.trend_label(),
                stop_loss.reference
            )));
        }
        if let Some(tp) = take_profit.price {
            if !tp.is_finite() {
                return Err(Error::InvalidResult("take-profit is not finite".to_string()));
            }
        }

        Ok(Self {
            timeframe: reading.timeframe,
            direction: reading.direction,
            crossover: reading.crossover,
            freshness: reading.freshness,
            current_price: reading.current_price,
            stop_loss,
            take_profit,
            early_exit,
            setup,
            confirmation: Confirmation::default(),
        })
    }

    pub fn with_confirmation(mut self, confirmation: Confirmation) -> Self {
        self.confirmation = confirmation;
        self
    }
}

/// Headline shown for a scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLabel {
    Confirmed(Direction),
    Existing(Direction),
    NoSignal,
    Error,
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalLabel::Confirmed(d) => write!(f, "CONFIRMED {}", d.trend_label()),
            SignalLabel::Existing(d) => write!(f, "EXISTING {}", d.trend_label()),
            SignalLabel::NoSignal => write!(f, "No Signal"),
            SignalLabel::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanOutcome {
    Signal(Box<TimeframeResult>),
    NoSignal,
    Error { message: String },
}

/// Per-instrument output of one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanResult {
    pub instrument: String,
    pub outcome: ScanOutcome,
    /// Verdict for every timeframe checked, in evaluation order.
    pub trace: Vec<TraceEntry>,
    /// Economic risk annotation, `"Safe"` when nothing is scheduled.
    pub risk: String,
}

impl ScanResult {
    pub fn signal(
        instrument: impl Into<String>,
        result: TimeframeResult,
        trace: Vec<TraceEntry>,
        risk: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            outcome: ScanOutcome::Signal(Box::new(result)),
            trace,
            risk: risk.into(),
        }
    }

    pub fn no_signal(
        instrument: impl Into<String>,
        trace: Vec<TraceEntry>,
        risk: impl Into<String>,
    ) -> Self {
        Self {
            instrument: instrument.into(),
            outcome: ScanOutcome::NoSignal,
            trace,
            risk: risk.into(),
        }
    }

    pub fn error(instrument: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            outcome: ScanOutcome::Error {
                message: message.into(),
            },
            trace: Vec::new(),
            risk: "N/A".to_string(),
        }
    }

    pub fn label(&self) -> SignalLabel {
        match &self.outcome {
            ScanOutcome::Signal(r) if r.freshness == Freshness::Fresh => {
                SignalLabel::Confirmed(r.direction)
            }
            ScanOutcome::Signal(r) => SignalLabel::Existing(r.direction),
            ScanOutcome::NoSignal => SignalLabel::NoSignal,
            ScanOutcome::Error { .. } => SignalLabel::Error,
        }
    }

    pub fn signal_result(&self) -> Option<&TimeframeResult> {
        match &self.outcome {
            ScanOutcome::Signal(r) => Some(r),
            _ => None,
        }
    }

    /// Flatten into the row handed to downstream reporting.
    pub fn to_record(&self) -> ScanRecord {
        let trace = match &self.outcome {
            ScanOutcome::Error { message } => format!("Error: {message}"),
            _ => format_trace(&self.trace),
        };
        let mut record = ScanRecord {
            instrument: self.instrument.clone(),
            signal: self.label().to_string(),
            timeframe: None,
            current_price: None,
            stop_loss: None,
            take_profit: None,
            take_profit_note: None,
            early_exit: None,
            cross_time: None,
            setup: None,
            confirmation: None,
            trace,
            risk: self.risk.clone(),
        };
        if let Some(r) = self.signal_result() {
            record.timeframe = Some(r.timeframe.to_string());
            record.current_price = Some(r.current_price);
            record.stop_loss = Some(r.stop_loss.price);
            record.take_profit = r.take_profit.price;
            record.take_profit_note = Some(r.take_profit.source.to_string());
            record.early_exit = Some(format_warnings(&r.early_exit));
            record.cross_time = r.crossover.map(|c| c.timestamp);
            record.setup = Some(r.setup.to_string());
            record.confirmation = Some(r.confirmation.to_string());
        }
        record
    }
}

/// Flat result row: the only contract with downstream report writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub instrument: String,
    pub signal: String,
    pub timeframe: Option<String>,
    pub current_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub take_profit_note: Option<String>,
    pub early_exit: Option<String>,
    pub cross_time: Option<DateTime<Utc>>,
    pub setup: Option<String>,
    /// 30-minute confirmation grade of a signal.
    pub confirmation: Option<String>,
    pub trace: String,
    pub risk: String,
}
