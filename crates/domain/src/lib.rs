//! # NOFX Domain
//!
//! 领域模型层 - 纯粹的业务类型与能力接口，不依赖任何基础设施
//!
//! - `entities`: 业务记录，如 MarketData, Signal, Order, Position, Protection
//! - `enums`: 业务枚举，如 Action, OrderSide, PositionSide, OrderType
//! - `traits`: 能力接口（`Store` / `Exchange` / `AiProvider` / `Strategy`），
//!   其余各层只依赖这些接口，实现放在基础设施侧

pub mod entities;
pub mod enums;
pub mod traits;

pub use entities::{
    AccountInfo, AuditEvent, Balance, BollingerBands, MarketData, MarketInfo, Ohlcv, Order,
    OrderRequest, Position, Protection, Signal, Ticker24h,
};
pub use enums::{Action, CandlePattern, OrderSide, OrderStatus, OrderType, PositionSide, TradeSide};
pub use traits::{
    AiError, AiProvider, ChatRequest, ChatResponse, Decision, Exchange, Message, Store, Strategy,
};
