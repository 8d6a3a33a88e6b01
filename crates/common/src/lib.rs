pub mod config;
pub mod error;
pub mod provider;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use provider::{EventRiskSource, MarketDataProvider};
pub use types::*;
