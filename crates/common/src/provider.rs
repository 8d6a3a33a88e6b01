use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Bar, Result, Timeframe};

/// Abstraction over the market-data source.
///
/// `YahooProvider` in `crates/engine` implements this for live scans; tests
/// use in-memory series. Only the scan orchestrator calls it, always through
/// the shared rate limiter and a per-request timeout.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the bar series for one instrument and timeframe, oldest first.
    ///
    /// Returns `Ok(None)` when the instrument has no usable history at this
    /// timeframe (e.g. too recently listed). Transport and parse failures are
    /// `Err`; the caller degrades either case to "no data" for that timeframe.
    async fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Result<Option<Vec<Bar>>>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}

/// Source of the free-text event-risk note attached to each scan result.
/// The note annotates a signal and never changes it.
pub trait EventRiskSource: Send + Sync {
    fn risk_annotation(&self, instrument: &str, now: DateTime<Utc>) -> String;
}
