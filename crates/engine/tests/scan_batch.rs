use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use common::{Bar, Error, MarketDataProvider, Result, SignalLabel, Timeframe};
use engine::{ScanOptions, Scanner};
use risk::EconomicCalendar;
use strategy::{IndicatorParams, SignalConfig};

/// Serves canned bars. Instruments named `BROKEN*` fail every request,
/// `PANIC*` panic inside the provider, and stalled pairs never answer.
#[derive(Default)]
struct InMemoryProvider {
    series: HashMap<(String, Timeframe), Vec<Bar>>,
    stalled: HashSet<(String, Timeframe)>,
    calls: Mutex<HashMap<(String, Timeframe), usize>>,
}

impl InMemoryProvider {
    fn with(mut self, instrument: &str, timeframe: Timeframe, closes: &[f64]) -> Self {
        self.series.insert((instrument.to_string(), timeframe), bars(closes));
        self
    }

    fn stall(mut self, instrument: &str, timeframe: Timeframe) -> Self {
        self.stalled.insert((instrument.to_string(), timeframe));
        self
    }

    fn calls(&self) -> HashMap<(String, Timeframe), usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryProvider {
    async fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Result<Option<Vec<Bar>>> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry((instrument.to_string(), timeframe))
            .or_default() += 1;
        if instrument.starts_with("BROKEN") {
            return Err(Error::Http("connection reset".to_string()));
        }
        if instrument.starts_with("PANIC") {
            panic!("corrupt payload for {instrument}");
        }
        if self.stalled.contains(&(instrument.to_string(), timeframe)) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(self.series.get(&(instrument.to_string(), timeframe)).cloned())
    }

    fn name(&self) -> &str {
        "in-memory"
    }
}

fn bars(closes: &[f64]) -> Vec<Bar> {
    let t0 = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar {
            timestamp: t0 + chrono::Duration::days(i as i64),
            open: c,
            high: c,
            low: c,
            close: c,
            volume: 1_000.0,
        })
        .collect()
}

/// Flat at 100, then five rising bars: the band middle crosses above the
/// long average five bars before the newest.
fn fresh_rally() -> Vec<f64> {
    let mut closes = vec![100.0; 30];
    closes.extend((1..=6).map(|k| 100.0 + 5.0 * k as f64));
    closes
}

fn cfg() -> SignalConfig {
    SignalConfig {
        min_bars: 20,
        ladder: vec![Timeframe::D1, Timeframe::W1],
        indicators: IndicatorParams {
            long_period: 10,
            band_period: 4,
            band_std_mult: 2.0,
        },
        ..SignalConfig::default()
    }
}

fn options() -> ScanOptions {
    ScanOptions {
        workers: 2,
        requests_per_minute: 10_000,
        fetch_timeout: Duration::from_secs(5),
    }
}

fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn results_follow_input_order_and_labels() {
    let provider = InMemoryProvider::default()
        .with("UP", Timeframe::D1, &fresh_rally())
        .with("UP", Timeframe::W1, &fresh_rally())
        .with("FLAT", Timeframe::D1, &[100.0; 40])
        .with("FLAT", Timeframe::W1, &[100.0; 40]);
    let scanner = Scanner::new(Arc::new(provider), cfg(), options());

    let results = scanner
        .scan(&tickers(&["UP", "FLAT", "BROKEN"]))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    assert_eq!(results[0].instrument, "UP");
    assert_eq!(results[0].label(), SignalLabel::Confirmed(common::Direction::Upward));
    let record = results[0].to_record();
    assert_eq!(record.signal, "CONFIRMED UPTREND");
    assert_eq!(record.timeframe.as_deref(), Some("1d"));
    assert!(record.stop_loss.unwrap() < record.current_price.unwrap());
    assert_eq!(record.trace, "1d: UP Fresh (5 bars)");
    assert_eq!(record.risk, "N/A");

    assert_eq!(results[1].label(), SignalLabel::NoSignal);
    assert_eq!(results[1].to_record().trace, "1d: Neutral | 1wk: Neutral");

    // transport failures degrade to missing data, not an error row
    assert_eq!(results[2].label(), SignalLabel::NoSignal);
    assert!(results[2].to_record().trace.contains("No Data"));
}

#[tokio::test]
async fn batch_errors_only_when_every_fetch_failed() {
    let scanner = Scanner::new(Arc::new(InMemoryProvider::default()), cfg(), options());
    let err = scanner
        .scan(&tickers(&["BROKEN-A", "BROKEN-B"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Provider(_)));
}

#[tokio::test]
async fn each_timeframe_is_fetched_once_per_instrument() {
    let provider = Arc::new(
        InMemoryProvider::default()
            .with("UP", Timeframe::D1, &fresh_rally())
            .with("UP", Timeframe::W1, &fresh_rally()),
    );
    let scanner = Scanner::new(provider.clone(), cfg(), options());
    scanner.scan(&tickers(&["UP"])).await.unwrap();

    let calls = provider.calls();
    assert!(calls.values().all(|&n| n == 1));
    // pivot source and the lower timeframes of the daily audit set
    for tf in [Timeframe::D1, Timeframe::W1, Timeframe::H4, Timeframe::H1, Timeframe::M30] {
        assert!(calls.contains_key(&("UP".to_string(), tf)), "{tf} not fetched");
    }
}

#[tokio::test]
async fn risk_source_is_merged() {
    let provider = InMemoryProvider::default().with("FLAT", Timeframe::D1, &[100.0; 40]);
    let scanner = Scanner::new(Arc::new(provider), cfg(), options())
        .with_risk_source(Arc::new(EconomicCalendar::default()));
    let results = scanner.scan(&tickers(&["FLAT"])).await.unwrap();
    assert_eq!(results[0].risk, "Safe");
}

#[tokio::test]
async fn stopped_scanner_launches_nothing() {
    let provider = Arc::new(InMemoryProvider::default().with("UP", Timeframe::D1, &fresh_rally()));
    let scanner = Scanner::new(provider.clone(), cfg(), options());
    scanner.stop();
    let results = scanner.scan(&tickers(&["UP", "FLAT"])).await.unwrap();
    assert!(results.is_empty());
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn panicking_instrument_becomes_error_row() {
    let provider = InMemoryProvider::default()
        .with("UP", Timeframe::D1, &fresh_rally())
        .with("FLAT", Timeframe::D1, &[100.0; 40]);
    let scanner = Scanner::new(Arc::new(provider), cfg(), options());

    let results = scanner
        .scan(&tickers(&["FLAT", "PANIC", "UP"]))
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].label(), SignalLabel::NoSignal);
    assert_eq!(results[1].label(), SignalLabel::Error);
    assert!(results[1].to_record().trace.contains("panic: corrupt payload for PANIC"));
    assert_eq!(results[2].label(), SignalLabel::Confirmed(common::Direction::Upward));
}

#[tokio::test]
async fn degenerate_setup_windows_do_not_abort_the_batch() {
    let provider = InMemoryProvider::default()
        .with("FLAT", Timeframe::D1, &[100.0; 40])
        .with("UP", Timeframe::D1, &fresh_rally());
    let mut cfg = cfg();
    cfg.setup.squeeze_lookback = 0;
    cfg.setup.slope_lookback = 0;
    let scanner = Scanner::new(Arc::new(provider), cfg, options());

    let results = scanner.scan(&tickers(&["FLAT", "UP"])).await.unwrap();
    assert_eq!(results[0].label(), SignalLabel::NoSignal);
    assert_eq!(results[1].label(), SignalLabel::Confirmed(common::Direction::Upward));
    assert_eq!(results[1].to_record().setup.as_deref(), Some("Crossover"));
}

#[tokio::test]
async fn timed_out_fetch_degrades_only_that_timeframe() {
    let provider = InMemoryProvider::default()
        .stall("SLOW", Timeframe::D1)
        .with("SLOW", Timeframe::W1, &fresh_rally());
    let options = ScanOptions {
        fetch_timeout: Duration::from_secs(1),
        ..options()
    };
    let scanner = Scanner::new(Arc::new(provider), cfg(), options);

    let results = scanner.scan(&tickers(&["SLOW"])).await.unwrap();
    let record = results[0].to_record();
    assert_eq!(record.signal, "CONFIRMED UPTREND");
    assert_eq!(record.timeframe.as_deref(), Some("1wk"));
    assert_eq!(
        record.trace,
        "1d: No Data (Request timed out after 1s) | 1wk: UP Fresh (5 bars)"
    );
}

#[tokio::test]
async fn scan_runs_on_a_spawned_task() {
    let provider = InMemoryProvider::default().with("UP", Timeframe::D1, &fresh_rally());
    let scanner = Arc::new(Scanner::new(Arc::new(provider), cfg(), options()));
    let names = tickers(&["UP"]);

    let handle = tokio::spawn({
        let scanner = scanner.clone();
        async move { scanner.scan(&names).await }
    });
    let results = handle.await.unwrap().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].to_record().confirmation.as_deref(), Some("N/A"));
}
