use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{future, stream, FutureExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use common::{Bar, Error, EventRiskSource, MarketDataProvider, Result, ScanResult, Timeframe};
use strategy::{build_result, compute_indicators, IndicatorSeries, Ladder, SignalConfig};

use crate::rate_limit::RateLimiter;

/// Risk text when no calendar is configured.
const NO_RISK_SOURCE: &str = "N/A";

/// Concurrency and pacing knobs for a [`Scanner`].
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub workers: usize,
    pub requests_per_minute: u32,
    pub fetch_timeout: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            requests_per_minute: 60,
            fetch_timeout: Duration::from_secs(20),
        }
    }
}

/// Runs the ladder for every instrument of a batch.
///
/// Instruments are scanned on a bounded pool and reported in input order.
/// One instrument failing, panics included, yields an `Error` result for it
/// and never aborts the batch.
pub struct Scanner {
    provider: Arc<dyn MarketDataProvider>,
    cfg: Arc<SignalConfig>,
    limiter: RateLimiter,
    options: ScanOptions,
    risk: Option<Arc<dyn EventRiskSource>>,
    stopped: Arc<AtomicBool>,
}

impl Scanner {
    pub fn new(provider: Arc<dyn MarketDataProvider>, cfg: SignalConfig, options: ScanOptions) -> Self {
        Self {
            provider,
            cfg: Arc::new(cfg),
            limiter: RateLimiter::new(options.requests_per_minute),
            options,
            risk: None,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_risk_source(mut self, risk: Arc<dyn EventRiskSource>) -> Self {
        self.risk = Some(risk);
        self
    }

    /// Stop launching new instrument scans. In-flight ones finish.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Flag shared with signal handlers.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stopped.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Scan a batch. Errors only when every fetch of every instrument failed.
    pub async fn scan(&self, instruments: &[String]) -> Result<Vec<ScanResult>> {
        let scan_id = Uuid::new_v4();
        info!(
            %scan_id,
            instruments = instruments.len(),
            workers = self.options.workers,
            provider = self.provider.name(),
            "Scan started"
        );

        let scanned: Vec<(ScanResult, FetchTally)> = stream::iter(instruments.to_vec())
            .take_while(|_| future::ready(!self.is_stopped()))
            .map(|instrument| self.scan_isolated(instrument))
            .buffered(self.options.workers.max(1))
            .collect()
            .await;

        let tally = scanned
            .iter()
            .fold(FetchTally::default(), |acc, (_, t)| acc.merge(*t));
        if tally.attempts > 0 && tally.failures == tally.attempts {
            warn!(%scan_id, attempts = tally.attempts, "Every fetch failed");
            return Err(Error::Provider(format!(
                "all {} fetches failed for {} instruments",
                tally.attempts,
                scanned.len()
            )));
        }

        let results: Vec<ScanResult> = scanned.into_iter().map(|(r, _)| r).collect();
        if results.len() < instruments.len() {
            warn!(%scan_id, scanned = results.len(), "Scan stopped early");
        }
        info!(%scan_id, scanned = results.len(), fetches = tally.attempts, "Scan finished");
        Ok(results)
    }

    /// Scan one instrument, turning a panic into its `Error` row.
    async fn scan_isolated(&self, instrument: String) -> (ScanResult, FetchTally) {
        match AssertUnwindSafe(self.scan_instrument(&instrument))
            .catch_unwind()
            .await
        {
            Ok(scanned) => scanned,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(instrument = %instrument, %message, "Instrument scan panicked");
                (
                    ScanResult::error(instrument, format!("panic: {message}")),
                    FetchTally::default(),
                )
            }
        }
    }

    async fn scan_instrument(&self, instrument: &str) -> (ScanResult, FetchTally) {
        let mut cache = SeriesCache::default();
        let result = match self.evaluate(instrument, &mut cache).await {
            Ok(result) => result,
            Err(e) => {
                warn!(instrument, error = %e, "Instrument scan failed");
                ScanResult::error(instrument, e.to_string())
            }
        };
        info!(instrument, signal = %result.label(), "Instrument scanned");
        (result, cache.tally)
    }

    async fn evaluate(&self, instrument: &str, cache: &mut SeriesCache) -> Result<ScanResult> {
        let mut ladder = Ladder::new(&self.cfg);
        for &timeframe in &self.cfg.ladder {
            self.load(cache, instrument, timeframe).await;
            let flow = match cache.get(timeframe) {
                Ok(series) => ladder.observe(timeframe, series),
                Err(reason) => ladder.observe_missing(timeframe, reason),
            };
            if flow.is_break() {
                break;
            }
        }
        let outcome = ladder.finish();
        let risk = self.risk_annotation(instrument);

        let Some(reading) = outcome.selected else {
            return Ok(ScanResult::no_signal(instrument, outcome.trace, risk));
        };

        let timeframe = reading.timeframe;
        let higher = timeframe.next_higher();
        if let Some(higher) = higher {
            self.load(cache, instrument, higher).await;
        }
        let audit_set = timeframe.audit_set();
        for &lower in &audit_set {
            self.load(cache, instrument, lower).await;
        }

        let series = cache.get(timeframe).map_err(Error::InsufficientData)?;
        let pivot_source: (Timeframe, &[Bar]) = match higher.map(|tf| (tf, cache.get(tf))) {
            Some((tf, Ok(s))) => (tf, s.bars.as_slice()),
            _ => (timeframe, series.bars.as_slice()),
        };
        let lower = audit_set
            .iter()
            .filter_map(|&tf| cache.get(tf).ok().map(|s| (tf, s)));

        let result = build_result(reading, series, pivot_source, lower, &self.cfg)?;
        Ok(ScanResult::signal(instrument, result, outcome.trace, risk))
    }

    /// Fetch and compute one timeframe unless it is already cached.
    async fn load(&self, cache: &mut SeriesCache, instrument: &str, timeframe: Timeframe) {
        if cache.entries.contains_key(&timeframe) {
            return;
        }
        cache.tally.attempts += 1;
        let entry = match self.fetch(instrument, timeframe).await {
            Ok(bars) => compute_indicators(bars, &self.cfg.indicators, self.cfg.min_bars)
                .map_err(|e| e.to_string()),
            Err(FetchError::Unavailable) => Err("no history".to_string()),
            Err(FetchError::Failed(e)) => {
                cache.tally.failures += 1;
                warn!(instrument, %timeframe, error = %e, "Fetch failed");
                Err(e.to_string())
            }
        };
        if let Err(reason) = &entry {
            debug!(instrument, %timeframe, %reason, "Timeframe unavailable");
        }
        cache.entries.insert(timeframe, entry);
    }

    async fn fetch(&self, instrument: &str, timeframe: Timeframe) -> Result<Vec<Bar>, FetchError> {
        self.limiter.acquire(instrument).await;
        let fetched = tokio::time::timeout(
            self.options.fetch_timeout,
            self.provider.get_bars(instrument, timeframe),
        )
        .await
        .map_err(|_| FetchError::Failed(Error::Timeout(self.options.fetch_timeout.as_secs())))?;
        match fetched {
            Ok(Some(bars)) => Ok(bars),
            Ok(None) => Err(FetchError::Unavailable),
            Err(e) => Err(FetchError::Failed(e)),
        }
    }

    fn risk_annotation(&self, instrument: &str) -> String {
        match &self.risk {
            Some(source) => source.risk_annotation(instrument, Utc::now()),
            None => NO_RISK_SOURCE.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

enum FetchError {
    Unavailable,
    Failed(Error),
}

#[derive(Debug, Default, Clone, Copy)]
struct FetchTally {
    attempts: usize,
    failures: usize,
}

impl FetchTally {
    fn merge(self, other: FetchTally) -> FetchTally {
        FetchTally {
            attempts: self.attempts + other.attempts,
            failures: self.failures + other.failures,
        }
    }
}

/// Per-instrument series, so no timeframe is fetched twice in one scan.
#[derive(Default)]
struct SeriesCache {
    entries: HashMap<Timeframe, std::result::Result<IndicatorSeries, String>>,
    tally: FetchTally,
}

impl SeriesCache {
    fn get(&self, timeframe: Timeframe) -> std::result::Result<&IndicatorSeries, String> {
        match self.entries.get(&timeframe) {
            Some(Ok(series)) => Ok(series),
            Some(Err(reason)) => Err(reason.clone()),
            None => Err("not fetched".to_string()),
        }
    }
}
