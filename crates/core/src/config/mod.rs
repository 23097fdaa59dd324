//! 配置模块：环境变量 -> 一次性 `Settings` 快照

pub mod environment;
pub mod settings;

pub use environment::{env_f64, env_i64, env_is_true, env_or_default};
pub use settings::Settings;

/// 协调存储键名统一前缀（边界处拼接，调用方只使用逻辑键名）
pub const REDIS_KEY_PREFIX: &str = "nofx:";

pub fn redis_key(name: &str) -> String {
    format!("{}{}", REDIS_KEY_PREFIX, name)
}
