//! DeepSeek 提供商

use async_trait::async_trait;

use nofx_core::Settings;
use nofx_domain::{AiError, AiProvider, ChatRequest, ChatResponse};

use super::{build_http_client, openai_compat_chat};

pub struct DeepSeekProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl DeepSeekProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: format!("{}/v1", settings.deepseek.base_url.trim_end_matches('/')),
            api_key: settings.deepseek.api_key.clone(),
            model: settings.deepseek.model.clone(),
            client: build_http_client(),
        }
    }
}

#[async_trait]
impl AiProvider for DeepSeekProvider {
    fn provider(&self) -> &'static str {
        "deepseek"
    }

    fn model(&self) -> String {
        if self.model.is_empty() { "deepseek-chat".to_string() } else { self.model.clone() }
    }

    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse, AiError> {
        openai_compat_chat(&self.client, &self.base_url, &self.api_key, req).await
    }
}
