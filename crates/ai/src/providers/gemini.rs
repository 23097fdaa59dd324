//! Google Gemini 提供商：请求/响应结构与 OpenAI 系不同，需要转换

use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use nofx_core::Settings;
use nofx_domain::{AiError, AiProvider, ChatRequest, ChatResponse};

use super::build_http_client;

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.gemini.base_url.trim_end_matches('/').to_string(),
            api_key: settings.gemini.api_key.clone(),
            model: settings.gemini.model.clone(),
            client: build_http_client(),
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> String {
        if self.model.is_empty() { "gemini-pro".to_string() } else { self.model.clone() }
    }

    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse, AiError> {
        let model = if req.model.is_empty() { self.model() } else { req.model.clone() };
        let api_url =
            format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);

        // 转换消息格式：role + parts[].text
        let contents: Vec<Value> = req
            .messages
            .iter()
            .map(|m| json!({ "role": m.role, "parts": [{ "text": m.content }] }))
            .collect();

        let body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens,
            },
        });

        let start = Instant::now();
        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
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
            warn!("Gemini API返回错误: status={}, body={}", status, text);
            return Err(AiError::Http { status, body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| AiError::InvalidResponse("响应中没有内容".to_string()))?;

        Ok(ChatResponse { content: content.to_string(), latency_ms, error: String::new() })
    }
}
