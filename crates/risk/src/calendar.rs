use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{Error, EventRiskSource, Result};

/// Look-ahead window for event risk.
pub const RISK_HORIZON_HOURS: i64 = 24;

/// Exchange suffix -> listing currency.
const SUFFIX_CURRENCIES: &[(&str, &str)] = &[
    ("L", "GBP"),
    ("DE", "EUR"),
    ("PA", "EUR"),
    ("AS", "EUR"),
    ("MI", "EUR"),
    ("MC", "EUR"),
    ("T", "JPY"),
    ("TO", "CAD"),
    ("AX", "AUD"),
    ("HK", "HKD"),
    ("SW", "CHF"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Impact {
    High,
    Medium,
    Low,
    Holiday,
    /// Anything else the feed publishes ("Non-Economic", blanks).
    #[serde(other)]
    Other,
}

impl Impact {
    /// Only high and medium impact events are worth flagging.
    pub fn is_material(self) -> bool {
        matches!(self, Impact::High | Impact::Medium)
    }
}

/// One scheduled release, in the weekly-calendar JSON layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    #[serde(rename = "title")]
    pub name: String,
    /// Currency code the event moves.
    #[serde(rename = "country")]
    pub currency: String,
    #[serde(rename = "date")]
    pub starts_at: DateTime<FixedOffset>,
    pub impact: Impact,
}

/// In-memory economic calendar.
#[derive(Debug, Clone, Default)]
pub struct EconomicCalendar {
    events: Vec<EconomicEvent>,
}

impl EconomicCalendar {
    pub fn new(mut events: Vec<EconomicEvent>) -> Self {
        events.sort_by_key(|e| e.starts_at);
        Self { events }
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let events: Vec<EconomicEvent> = serde_json::from_str(raw)?;
        Ok(Self::new(events))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read calendar at '{}': {e}", path.display()))
        })?;
        let calendar = Self::from_json_str(&raw)?;
        info!(path = %path.display(), events = calendar.events.len(), "Economic calendar loaded");
        Ok(calendar)
    }

    pub fn events(&self) -> &[EconomicEvent] {
        &self.events
    }

    /// Material events for `instrument`'s currencies in `[now, now + 24h]`,
    /// earliest first.
    pub fn upcoming(&self, instrument: &str, now: DateTime<Utc>) -> Vec<&EconomicEvent> {
        let currencies = implied_currencies(instrument);
        let horizon = now + Duration::hours(RISK_HORIZON_HOURS);
        self.events
            .iter()
            .filter(|e| e.impact.is_material())
            .filter(|e| currencies.iter().any(|c| c.eq_ignore_ascii_case(&e.currency)))
            .filter(|e| {
                let at = e.starts_at.with_timezone(&Utc);
                at >= now && at <= horizon
            })
            .collect()
    }
}

impl EventRiskSource for EconomicCalendar {
    /// `"Safe"`, or `"CUR NAME (IMPACT) at HH:MM"` entries (UTC) joined by
    /// `" | "`.
    fn risk_annotation(&self, instrument: &str, now: DateTime<Utc>) -> String {
        let upcoming = self.upcoming(instrument, now);
        if upcoming.is_empty() {
            return "Safe".to_string();
        }
        debug!(instrument, count = upcoming.len(), "Upcoming material events");
        upcoming
            .iter()
            .map(|e| {
                format!(
                    "{} {} ({:?}) at {}",
                    e.currency.to_ascii_uppercase(),
                    e.name,
                    e.impact,
                    e.starts_at.with_timezone(&Utc).format("%H:%M")
                )
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Currencies whose news moves `instrument`.
///
/// FX pairs (`EURUSD=X`) give both legs, `JPY=X` is quoted against USD,
/// crypto pairs (`BTC-USD`) give the quote currency, exchange suffixes map to
/// the listing currency, and everything else is taken as USD.
pub fn implied_currencies(instrument: &str) -> Vec<String> {
    let symbol = instrument.trim().to_ascii_uppercase();

    if let Some(pair) = symbol.strip_suffix("=X") {
        if !pair.chars().all(|c| c.is_ascii_alphabetic()) {
            return vec!["USD".to_string()];
        }
        return match pair.len() {
            6 => vec![pair[..3].to_string(), pair[3..].to_string()],
            3 => vec!["USD".to_string(), pair.to_string()],
            _ => vec!["USD".to_string()],
        };
    }

    if let Some((_, quote)) = symbol.rsplit_once('-') {
        if quote.len() == 3 && quote.chars().all(|c| c.is_ascii_alphabetic()) {
            return vec![quote.to_string()];
        }
    }

    if let Some((_, suffix)) = symbol.rsplit_once('.') {
        if let Some((_, cur)) = SUFFIX_CURRENCIES.iter().find(|(s, _)| *s == suffix) {
            return vec![cur.to_string()];
        }
    }

    vec!["USD".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"[
        {"title": "Non-Farm Employment Change", "country": "USD", "date": "2024-03-08T08:30:00-05:00", "impact": "High", "forecast": "200K", "previous": "353K"},
        {"title": "Main Refinancing Rate", "country": "EUR", "date": "2024-03-07T08:15:00-05:00", "impact": "High", "forecast": "4.50%", "previous": "4.50%"},
        {"title": "Bank Holiday", "country": "GBP", "date": "2024-03-07T03:00:00-05:00", "impact": "Holiday", "forecast": "", "previous": ""},
        {"title": "Unemployment Claims", "country": "USD", "date": "2024-03-07T08:30:00-05:00", "impact": "Medium", "forecast": "", "previous": ""},
        {"title": "Crude Oil Inventories", "country": "USD", "date": "2024-03-07T10:30:00-05:00", "impact": "Low", "forecast": "", "previous": ""},
        {"title": "Speech", "country": "JPY", "date": "2024-03-07T20:00:00-05:00", "impact": "Non-Economic", "forecast": "", "previous": ""}
    ]"#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_feed_including_unknown_impacts() {
        let cal = EconomicCalendar::from_json_str(FEED).unwrap();
        assert_eq!(cal.events().len(), 6);
        assert_eq!(cal.events().last().unwrap().impact, Impact::High);
        assert!(cal.events().iter().any(|e| e.impact == Impact::Other));
    }

    #[test]
    fn annotation_lists_material_events_in_time_order() {
        let cal = EconomicCalendar::from_json_str(FEED).unwrap();
        assert_eq!(
            cal.risk_annotation("EURUSD=X", now()),
            "EUR Main Refinancing Rate (High) at 13:15 | USD Unemployment Claims (Medium) at 13:30"
        );
    }

    #[test]
    fn events_outside_window_are_ignored() {
        let cal = EconomicCalendar::from_json_str(FEED).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 7, 14, 0, 0).unwrap();
        // claims and rate decision are past; payrolls is inside the next day
        assert_eq!(
            cal.risk_annotation("AAPL", late),
            "USD Non-Farm Employment Change (High) at 13:30"
        );
        let far = Utc.with_ymd_and_hms(2024, 3, 9, 0, 0, 0).unwrap();
        assert_eq!(cal.risk_annotation("AAPL", far), "Safe");
    }

    #[test]
    fn unrelated_currency_is_safe() {
        let cal = EconomicCalendar::from_json_str(FEED).unwrap();
        assert_eq!(cal.risk_annotation("7203.T", now()), "Safe");
        assert_eq!(cal.risk_annotation("VOD.L", now()), "Safe");
    }

    #[test]
    fn implied_currency_rules() {
        assert_eq!(implied_currencies("eurusd=x"), vec!["EUR", "USD"]);
        assert_eq!(implied_currencies("JPY=X"), vec!["USD", "JPY"]);
        assert_eq!(implied_currencies("BTC-USD"), vec!["USD"]);
        assert_eq!(implied_currencies("SAP.DE"), vec!["EUR"]);
        assert_eq!(implied_currencies("SHOP.TO"), vec!["CAD"]);
        assert_eq!(implied_currencies("BRK-B"), vec!["USD"]);
        assert_eq!(implied_currencies("MSFT"), vec!["USD"]);
    }

    #[test]
    fn malformed_feed_is_json_error() {
        assert!(matches!(
            EconomicCalendar::from_json_str("{not json"),
            Err(Error::Json(_))
        ));
    }
}
