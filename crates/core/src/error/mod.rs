// 错误处理模块

pub use anyhow::{anyhow, Error as AnyhowError, Result};
pub use thiserror::Error;

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Exchange error: {0}")]
    ExchangeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("AI contract error: {0}")]
    AiContractError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;
