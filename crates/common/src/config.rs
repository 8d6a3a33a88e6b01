use crate::{Error, Result};

/// Process-level configuration loaded from environment variables at startup.
///
/// Signal thresholds live in the TOML file pointed to by `scan_config_path`;
/// this struct only carries what the binary needs to wire the scan together.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instruments to scan, de-duplicated, in the order given.
    pub tickers: Vec<String>,

    // Signal config file path
    pub scan_config_path: String,

    // Economic calendar JSON, optional
    pub calendar_path: Option<String>,

    // Worker pool / rate limiting
    pub workers: usize,
    pub requests_per_minute: u32,
    pub fetch_timeout_secs: u64,
}

impl Config {
    /// Load all configuration from environment variables.
    /// Loads `.env` if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let tickers = parse_tickers(&required_env("SCAN_TICKERS")?);
        if tickers.is_empty() {
            return Err(Error::Config(
                "SCAN_TICKERS must name at least one instrument".to_string(),
            ));
        }

        let workers: usize = parse_env("SCAN_WORKERS", 4)?;
        if workers == 0 {
            return Err(Error::Config("SCAN_WORKERS must be >= 1".to_string()));
        }
        let requests_per_minute: u32 = parse_env("SCAN_REQUESTS_PER_MINUTE", 60)?;
        if requests_per_minute == 0 {
            return Err(Error::Config(
                "SCAN_REQUESTS_PER_MINUTE must be >= 1".to_string(),
            ));
        }

        Ok(Config {
            tickers,
            scan_config_path: optional_env("SCAN_CONFIG_PATH")
                .unwrap_or_else(|| "config/scan.toml".to_string()),
            calendar_path: optional_env("CALENDAR_PATH"),
            workers,
            requests_per_minute,
            fetch_timeout_secs: parse_env("SCAN_FETCH_TIMEOUT_SECS", 20)?,
        })
    }
}

/// Split a comma/whitespace separated ticker list, upper-casing and dropping
/// duplicates while keeping first-seen order.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        Error::Config(format!(
            "Required environment variable '{key}' is not set. Check your .env file."
        ))
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match optional_env(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: '{v}'"))),
        None => Ok(default),
    }
}
