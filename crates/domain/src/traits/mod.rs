//! 能力接口
//!
//! 遵循依赖倒置：上层组件只依赖这里的抽象，
//! Redis / Binance / 各家大模型的实现都在基础设施侧

pub mod ai_trait;
pub mod exchange_trait;
pub mod store_trait;
pub mod strategy_trait;

pub use ai_trait::{AiError, AiProvider, ChatRequest, ChatResponse, Message};
pub use exchange_trait::Exchange;
pub use store_trait::Store;
pub use strategy_trait::{Decision, Strategy};
