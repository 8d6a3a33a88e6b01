use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EventRiskSource};
use engine::{ScanOptions, Scanner, YahooProvider};
use risk::EconomicCalendar;
use strategy::SignalConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging (stderr; stdout carries the result rows) ─────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("Failed to load environment config")?;
    let signal_cfg = SignalConfig::load(&cfg.scan_config_path)
        .with_context(|| format!("Failed to load scan config '{}'", cfg.scan_config_path))?;
    info!(
        tickers = cfg.tickers.len(),
        ladder = ?signal_cfg.ladder,
        fallback = ?signal_cfg.fallback,
        "TrendScan starting"
    );

    // ── Collaborators ─────────────────────────────────────────────────────────
    let fetch_timeout = Duration::from_secs(cfg.fetch_timeout_secs);
    let provider = Arc::new(YahooProvider::new(fetch_timeout)?);

    let calendar: Option<Arc<dyn EventRiskSource>> = match &cfg.calendar_path {
        Some(path) => match EconomicCalendar::from_json_file(path) {
            Ok(cal) => Some(Arc::new(cal) as Arc<dyn EventRiskSource>),
            Err(e) => {
                warn!(path = %path, error = %e, "Calendar unavailable, continuing without event risk");
                None
            }
        },
        None => None,
    };

    // ── Scanner ───────────────────────────────────────────────────────────────
    let options = ScanOptions {
        workers: cfg.workers,
        requests_per_minute: cfg.requests_per_minute,
        fetch_timeout,
    };
    let mut scanner = Scanner::new(provider, signal_cfg, options);
    if let Some(calendar) = calendar {
        scanner = scanner.with_risk_source(calendar);
    }

    // Ctrl-C stops launching new instruments; in-flight ones finish.
    let stop = scanner.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received. Finishing in-flight instruments.");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let results = scanner.scan(&cfg.tickers).await?;

    // ── Result sink ───────────────────────────────────────────────────────────
    let mut out = std::io::stdout().lock();
    for result in &results {
        serde_json::to_writer(&mut out, &result.to_record())?;
        writeln!(out)?;
    }
    out.flush()?;

    info!(results = results.len(), "Scan complete");
    Ok(())
}
