//! Yahoo Finance v8 chart API provider.
//!
//! Yahoo serves no 4-hour interval, so `4h` bars are built from hourly bars
//! bucketed on UTC 4-hour boundaries.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use common::{Bar, Error, MarketDataProvider, Result, Timeframe};

const BASE_URL: &str = "https://query2.finance.yahoo.com";
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";
const FOUR_HOURS_SECS: i64 = 4 * 60 * 60;

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Quote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Bar source backed by Yahoo's public chart endpoint.
pub struct YahooProvider {
    http: Client,
    base_url: String,
}

impl YahooProvider {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, request_timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Interval and history range requested for a timeframe.
    fn query_params(timeframe: Timeframe) -> (&'static str, &'static str) {
        match timeframe {
            Timeframe::M30 => ("30m", "60d"),
            Timeframe::H1 | Timeframe::H4 => ("60m", "730d"),
            Timeframe::D1 => ("1d", "5y"),
            Timeframe::W1 => ("1wk", "max"),
            Timeframe::Mo1 => ("1mo", "max"),
        }
    }

    fn chart_url(&self, symbol: &str, timeframe: Timeframe) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid provider URL '{}': {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("Provider URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["v8", "finance", "chart", symbol]);
        let (interval, range) = Self::query_params(timeframe);
        url.query_pairs_mut()
            .append_pair("interval", interval)
            .append_pair("range", range)
            .append_pair("includePrePost", "false");
        Ok(url)
    }
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    async fn get_bars(&self, instrument: &str, timeframe: Timeframe) -> Result<Option<Vec<Bar>>> {
        let url = self.chart_url(instrument, timeframe)?;
        debug!(instrument, %timeframe, %url, "Requesting chart");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;

        // Unknown symbols come back as 404 with a JSON error body.
        let chart: ChartResponse = match serde_json::from_str(&body) {
            Ok(chart) => chart,
            Err(_) if !status.is_success() => {
                return Err(Error::Http(format!("HTTP {status} for {instrument}")));
            }
            Err(e) => return Err(e.into()),
        };

        let Some(bars) = parse_chart(instrument, chart)? else {
            return Ok(None);
        };
        if timeframe == Timeframe::H4 {
            return Ok(Some(aggregate_four_hour(&bars)));
        }
        Ok(Some(bars))
    }

    fn name(&self) -> &str {
        "yahoo"
    }
}

/// Bars from a chart response, oldest first. `None` for unknown symbols or an
/// empty history. Rows without a close are dropped.
fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Option<Vec<Bar>>> {
    let Some(result) = resp.chart.result else {
        return match resp.chart.error {
            Some(err) if err.code == "Not Found" => Ok(None),
            Some(err) => Err(Error::Provider(format!(
                "{symbol}: {} {}",
                err.code,
                err.description.unwrap_or_default()
            ))),
            None => Err(Error::Provider(format!("{symbol}: empty chart result"))),
        };
    };
    let Some(data) = result.into_iter().next() else {
        return Ok(None);
    };
    let Some(timestamps) = data.timestamp else {
        return Ok(None);
    };
    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();

    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let Some(close) = quote.close.get(i).copied().flatten() else {
            continue;
        };
        let timestamp = DateTime::<Utc>::from_timestamp(ts, 0)
            .ok_or_else(|| Error::Provider(format!("{symbol}: invalid timestamp {ts}")))?;
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten().unwrap_or(close);
        bars.push(Bar {
            timestamp,
            open: field(&quote.open),
            high: field(&quote.high),
            low: field(&quote.low),
            close,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0.0),
        });
    }

    if bars.is_empty() {
        return Ok(None);
    }
    Ok(Some(bars))
}

/// Merge hourly bars into UTC 4-hour buckets stamped at the bucket start.
pub fn aggregate_four_hour(bars: &[Bar]) -> Vec<Bar> {
    let mut out: Vec<Bar> = Vec::with_capacity(bars.len() / 4 + 1);
    let mut current_bucket = None;
    for bar in bars {
        let bucket = bar.timestamp.timestamp().div_euclid(FOUR_HOURS_SECS);
        match out.last_mut() {
            Some(agg) if current_bucket == Some(bucket) => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                let start = DateTime::<Utc>::from_timestamp(bucket * FOUR_HOURS_SECS, 0)
                    .unwrap_or(bar.timestamp);
                out.push(Bar {
                    timestamp: start,
                    ..*bar
                });
                current_bucket = Some(bucket);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL"},
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open": [187.15, null, 182.15],
                        "high": [188.44, 185.88, 183.09],
                        "low": [183.89, 183.43, 180.88],
                        "close": [185.64, null, 181.91],
                        "volume": [82488700, 58414500, 71983600]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    fn bar(hour: u32, open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 2, hour, 30, 0).unwrap(),
            open,
            high,
            low,
            close,
            volume: 10.0,
        }
    }

    #[test]
    fn parses_chart_and_drops_rows_without_close() {
        let resp: ChartResponse = serde_json::from_str(CHART).unwrap();
        let bars = parse_chart("AAPL", resp).unwrap().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 185.64);
        assert_eq!(bars[1].open, 182.15);
        assert_eq!(bars[1].volume, 71983600.0);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[test]
    fn not_found_is_unavailable() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(parse_chart("ZZZZ", resp).unwrap().is_none());
    }

    #[test]
    fn other_chart_errors_are_provider_errors() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Bad Request","description":"Invalid input"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(parse_chart("AAPL", resp), Err(Error::Provider(_))));
    }

    #[test]
    fn four_hour_buckets_align_to_utc() {
        let hourly = vec![
            bar(0, 10.0, 11.0, 9.0, 10.5),
            bar(1, 10.5, 12.0, 10.0, 11.0),
            bar(3, 11.0, 11.5, 8.0, 9.0),
            bar(4, 9.0, 9.5, 8.5, 9.2),
            bar(7, 9.2, 10.0, 9.0, 9.8),
            bar(8, 9.8, 9.9, 9.7, 9.9),
        ];
        let agg = aggregate_four_hour(&hourly);
        assert_eq!(agg.len(), 3);

        assert_eq!(agg[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(agg[0].open, 10.0);
        assert_eq!(agg[0].high, 12.0);
        assert_eq!(agg[0].low, 8.0);
        assert_eq!(agg[0].close, 9.0);
        assert_eq!(agg[0].volume, 30.0);

        assert_eq!(agg[1].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 4, 0, 0).unwrap());
        assert_eq!(agg[1].close, 9.8);
        assert_eq!(agg[2].close, 9.9);
    }

    #[test]
    fn chart_url_encodes_symbol_and_range() {
        let provider = YahooProvider::with_base_url("https://example.test", Duration::from_secs(5)).unwrap();
        let url = provider.chart_url("EURUSD=X", Timeframe::H4).unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/EURUSD=X");
        let query = url.query().unwrap();
        assert!(query.contains("interval=60m"));
        assert!(query.contains("range=730d"));
    }
}
