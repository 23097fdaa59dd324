//! AI 提供商实现

pub mod deepseek;
pub mod gemini;
pub mod openai;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::warn;

use nofx_core::Settings;
use nofx_domain::{AiError, ChatRequest, ChatResponse};

pub use deepseek::DeepSeekProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// 按配置创建 AI 提供商。指定提供商不可用时回退 DeepSeek，
/// 全部不可用返回错误（上层降级到规则模式）
pub fn create_provider(settings: &Settings) -> Result<Arc<dyn nofx_domain::AiProvider>> {
    match settings.ai_provider.as_str() {
        "deepseek" => {
            if !settings.deepseek.is_usable() {
                return Err(anyhow!("DeepSeek未启用或API Key未配置"));
            }
            Ok(Arc::new(DeepSeekProvider::new(settings)))
        }
        "openai" => {
            if !settings.openai.is_usable() {
                return Err(anyhow!("OpenAI未启用或API Key未配置"));
            }
            Ok(Arc::new(OpenAiProvider::new(settings)))
        }
        "gemini" => {
            if !settings.gemini.is_usable() {
                return Err(anyhow!("Gemini未启用或API Key未配置"));
            }
            Ok(Arc::new(GeminiProvider::new(settings)))
        }
        other => {
            warn!("未知的AI提供商，尝试使用DeepSeek: provider={}", other);
            if settings.deepseek.is_usable() {
                Ok(Arc::new(DeepSeekProvider::new(settings)))
            } else {
                Err(anyhow!("未配置有效的AI提供商"))
            }
        }
    }
}

/// AI 提供商共用的 HTTP 客户端（30 秒超时）
pub(crate) fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// OpenAI 兼容的 chat/completions 调用（DeepSeek 与 OpenAI 共用）
pub(crate) async fn openai_compat_chat(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    req: &ChatRequest,
) -> Result<ChatResponse, AiError> {
    let api_url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

    let body = serde_json::json!({
        "model": req.model,
        "messages": req.messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
    });

    let start = Instant::now();
    let response = client
        .post(&api_url)
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", api_key))
        .json(&body)
        .send()
        .await
        .map_err(|e| AiError::Request(e.to_string()))?;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_millis() as i64;
    let text = response.text().await.map_err(|e| AiError::Request(e.to_string()))?;

    if status == 429 {
        return Err(AiError::RateLimited { status, latency_ms });
    }
    if status != 200 {
        warn!("AI API返回错误: status={}, body={}", status, text);
        return Err(AiError::Http { status, body: text });
    }

    let parsed: Value =
        serde_json::from_str(&text).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

    let content = parsed
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.pointer("/message/content"))
        .and_then(Value::as_str)
        .ok_or_else(|| AiError::InvalidResponse("响应中没有choices".to_string()))?;

    Ok(ChatResponse { content: content.to_string(), latency_ms, error: String::new() })
}
