use serde::{Deserialize, Serialize};

use common::{Error, Result, Timeframe};

/// Signal engine configuration (TOML). Every field has a default, so an empty
/// file is a valid configuration.
///
/// Example `config/scan.toml`:
/// ```toml
/// min_bars = 250
/// search_depth = 500
/// stop_loss_buffer = 0.01
/// ladder = ["4h", "1d", "1wk", "1mo"]
/// fallback = "first_existing"
///
/// [freshness]
/// min_fresh = 3
/// max_fresh = 10
///
/// [indicators]
/// long_period = 200
/// band_period = 20
/// band_std_mult = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Series shorter than this are rejected before any indicator work.
    pub min_bars: usize,
    /// Maximum number of bar pairs inspected when locating a crossover.
    pub search_depth: usize,
    /// Relative |middle - long| / long at or below which a trend is neutral.
    pub neutral_tolerance: f64,
    /// Stop distance from the crossover price (0.01 = 1%).
    pub stop_loss_buffer: f64,
    /// Minimum age of an opposing lower-timeframe crossover to warn about.
    pub exit_min_bars: usize,
    /// Timeframes evaluated by the ladder, ascending.
    pub ladder: Vec<Timeframe>,
    pub fallback: FallbackPolicy,
    pub freshness: FreshnessWindow,
    pub indicators: IndicatorParams,
    pub setup: SetupParams,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_bars: 250,
            search_depth: 500,
            neutral_tolerance: 1e-6,
            stop_loss_buffer: 0.01,
            exit_min_bars: 3,
            ladder: vec![Timeframe::H4, Timeframe::D1, Timeframe::W1, Timeframe::Mo1],
            fallback: FallbackPolicy::default(),
            freshness: FreshnessWindow::default(),
            indicators: IndicatorParams::default(),
            setup: SetupParams::default(),
        }
    }
}

/// Which non-fresh results the ladder may fall back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// First timeframe whose trend is established: no crossover within the
    /// search depth, or a crossover older than the freshness window.
    #[default]
    FirstExisting,
    /// First timeframe with no crossover within the search depth.
    MatureOnly,
    /// Fresh results only.
    Strict,
}

/// Inclusive bars-ago range in which a crossover is actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FreshnessWindow {
    pub min_fresh: usize,
    pub max_fresh: usize,
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self {
            min_fresh: 3,
            max_fresh: 10,
        }
    }
}

impl FreshnessWindow {
    pub fn contains(&self, bars_ago: usize) -> bool {
        (self.min_fresh..=self.max_fresh).contains(&bars_ago)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndicatorParams {
    /// EMA period of the long-term trend average.
    pub long_period: usize,
    /// SMA period of the Bollinger band middle.
    pub band_period: usize,
    /// Standard deviations between the middle and each band.
    pub band_std_mult: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            long_period: 200,
            band_period: 20,
            band_std_mult: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SetupParams {
    /// Band-width history used for the squeeze threshold.
    pub squeeze_lookback: usize,
    /// Quantile of that history below which the band is squeezed.
    pub squeeze_percentile: f64,
    /// Bars fitted for the trend-slope context check.
    pub slope_lookback: usize,
    /// Max relative distance of band middle from the long average for a pullback.
    pub pullback_tolerance: f64,
    /// Closes in `[newest - window_start, newest - window_end)` are checked for
    /// a prior excursion across the long average.
    pub pullback_window_start: usize,
    pub pullback_window_end: usize,
}

impl Default for SetupParams {
    fn default() -> Self {
        Self {
            squeeze_lookback: 120,
            squeeze_percentile: 0.20,
            slope_lookback: 60,
            pullback_tolerance: 0.03,
            pullback_window_start: 80,
            pullback_window_end: 20,
        }
    }
}

impl SignalConfig {
    /// Load and validate from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read signal config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: SignalConfig = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        if ind.long_period < 1 || ind.band_period < 1 {
            return Err(Error::Config("indicator periods must be >= 1".to_string()));
        }
        if !(ind.band_std_mult.is_finite() && ind.band_std_mult > 0.0) {
            return Err(Error::Config("band_std_mult must be positive".to_string()));
        }
        let warmup = ind.long_period.max(ind.band_period);
        if self.min_bars <= warmup {
            return Err(Error::Config(format!(
                "min_bars ({}) must exceed the indicator warm-up ({warmup})",
                self.min_bars
            )));
        }
        if self.search_depth == 0 {
            return Err(Error::Config("search_depth must be >= 1".to_string()));
        }
        if self.freshness.min_fresh > self.freshness.max_fresh {
            return Err(Error::Config(format!(
                "freshness window is inverted: {} > {}",
                self.freshness.min_fresh, self.freshness.max_fresh
            )));
        }
        if !(self.stop_loss_buffer > 0.0 && self.stop_loss_buffer < 1.0) {
            return Err(Error::Config(
                "stop_loss_buffer must lie in (0, 1)".to_string(),
            ));
        }
        if !(self.neutral_tolerance >= 0.0 && self.neutral_tolerance.is_finite()) {
            return Err(Error::Config(
                "neutral_tolerance must be a non-negative number".to_string(),
            ));
        }
        if self.ladder.is_empty() {
            return Err(Error::Config("ladder must name at least one timeframe".to_string()));
        }
        if self.ladder.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::Config(
                "ladder timeframes must be strictly ascending".to_string(),
            ));
        }
        let setup = &self.setup;
        if !(0.0..=1.0).contains(&setup.squeeze_percentile) {
            return Err(Error::Config(
                "squeeze_percentile must lie in [0, 1]".to_string(),
            ));
        }
        if setup.squeeze_lookback < 2 || setup.slope_lookback < 2 {
            return Err(Error::Config(
                "squeeze_lookback and slope_lookback must be >= 2".to_string(),
            ));
        }
        if setup.pullback_window_end == 0 {
            return Err(Error::Config(
                "pullback_window_end must be >= 1 so the newest bar is excluded".to_string(),
            ));
        }
        if setup.pullback_window_start <= setup.pullback_window_end {
            return Err(Error::Config(
                "pullback window start must be older than its end".to_string(),
            ));
        }
        Ok(())
    }
}
