//! # NOFX Exchange
//!
//! Binance USDⓈ-M 永续合约客户端：限流、退避、签名、DRY_RUN

pub mod binance;
pub mod http_client;
pub mod rate_limiter;

pub use binance::BinanceExchange;
pub use http_client::HttpClient;
pub use rate_limiter::{parse_retry_after, BackoffManager, RateLimiter};
