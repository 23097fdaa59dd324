//! # NOFX AI
//!
//! AI 交易员：提供商客户端（DeepSeek / OpenAI / Gemini）与
//! 决策流程（提示词构造、重试、响应解析）

pub mod providers;
pub mod trader;

pub use providers::create_provider;
pub use trader::AiTrader;
