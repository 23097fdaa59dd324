//! # NOFX Core
//!
//! 核心基础设施：配置、缓存（协调存储实现）、日志、错误

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod logger;

pub use config::{redis_key, Settings};
pub use context::TradeContext;
pub use error::{AppError, AppResult};
