//! OpenAI 提供商

use async_trait::async_trait;

use nofx_core::Settings;
use nofx_domain::{AiError, AiProvider, ChatRequest, ChatResponse};

use super::{build_http_client, openai_compat_chat};

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(settings: &Settings) -> Self {
        Self {
            base_url: settings.openai.base_url.clone(),
            api_key: settings.openai.api_key.clone(),
            model: settings.openai.model.clone(),
            client: build_http_client(),
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn provider(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> String {
        if self.model.is_empty() { "gpt-4o-mini".to_string() } else { self.model.clone() }
    }

    async fn chat_completion(&self, req: &ChatRequest) -> Result<ChatResponse, AiError> {
        openai_compat_chat(&self.client, &self.base_url, &self.api_key, req).await
    }
}
