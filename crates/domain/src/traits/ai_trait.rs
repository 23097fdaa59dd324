//! AI 提供商抽象：统一的对话补全接口
//!
//! DeepSeek / OpenAI / Gemini 实现之间可互换，
//! 各实现负责与自家 JSON 结构的互转

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 消息角色固定为 system / user / assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub latency_ms: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// AI 调用错误分类：限流需要与普通失败区分（重试计数策略相同，
/// 但对外呈现为独立的 rate-limited 错误）
#[derive(Debug, Error)]
pub enum AiError {
    #[error("rate limited: HTTP {status}")]
    RateLimited { status: u16, latency_ms: i64 },

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error: HTTP {status}")]
    Http { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait AiProvider: Send + Sync {
    /// 提供商标识（deepseek / openai / gemini）
    fn provider(&self) -> &'static str;

    /// 当前使用的模型名
    fn model(&self) -> String;

    /// 对话补全
    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse, AiError>;
}
