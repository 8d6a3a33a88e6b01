pub mod rate_limit;
pub mod scanner;
pub mod yahoo;

pub use rate_limit::RateLimiter;
pub use scanner::{ScanOptions, Scanner};
pub use yahoo::YahooProvider;
