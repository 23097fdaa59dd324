//! 业务实体

pub mod audit;
pub mod market_data;
pub mod order;
pub mod position;
pub mod protection;
pub mod signal;

pub use audit::AuditEvent;
pub use market_data::{AccountInfo, BollingerBands, MarketData, MarketInfo, Ohlcv, Ticker24h};
pub use order::{Order, OrderRequest};
pub use position::{Balance, Position};
pub use protection::Protection;
pub use signal::Signal;
