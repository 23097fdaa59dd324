//! 交易所 HTTP 封装
//!
//! 所有出站请求先等退避窗口、再取限流令牌；
//! 签名端点按「字典序参数 + timestamp + HMAC-SHA256」规则构造

use std::time::Duration;

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use sha2::Sha256;
use tracing::warn;

use nofx_core::Settings;

use crate::rate_limiter::{parse_retry_after, BackoffManager, RateLimiter};

/// 退避管理器中的端点组标识
const ENDPOINT_GROUP: &str = "exchange";

pub struct HttpClient {
    client: Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    rate_limiter: RateLimiter,
    backoff: BackoffManager,
}

impl HttpClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(settings.binance_http_timeout_sec))
            .build()
            .map_err(|e| anyhow!("build http client failed: {}", e))?;

        Ok(Self {
            client,
            base_url: settings.binance_fapi_base_url.trim_end_matches('/').to_string(),
            api_key: settings.binance_api_key.clone(),
            secret_key: settings.binance_secret_key.clone(),
            rate_limiter: RateLimiter::new(settings.rate_limit_rps, settings.rate_limit_capacity),
            backoff: BackoffManager::new(),
        })
    }

    /// 公共端点 GET，返回原始 JSON
    pub async fn fetch_json(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value> {
        self.backoff.wait_backoff(ENDPOINT_GROUP).await;
        self.rate_limiter.wait(1).await;

        let mut url = format!("{}{}", self.base_url, endpoint);
        if !params.is_empty() {
            let query: Vec<String> =
                params.iter().map(|(k, v)| format!("{}={}", k, url_encode(v))).collect();
            url = format!("{}?{}", url, query.join("&"));
        }

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow!("request failed: {}", e))?;

        self.handle_response(endpoint, response).await
    }

    /// 签名端点请求。参数按键名排序、url 编码，追加毫秒时间戳，
    /// HMAC-SHA256 签名以 `&signature=` 结尾附加
    pub async fn signed_request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value> {
        if self.api_key.is_empty() || self.secret_key.is_empty() {
            return Err(anyhow!("API keys required for signed endpoint {}", endpoint));
        }

        self.backoff.wait_backoff(ENDPOINT_GROUP).await;
        self.rate_limiter.wait(1).await;

        let mut sorted: Vec<(String, String)> =
            params.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        sorted.push(("timestamp".to_string(), chrono::Utc::now().timestamp_millis().to_string()));
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let query: Vec<String> =
            sorted.iter().map(|(k, v)| format!("{}={}", k, url_encode(v))).collect();
        let mut query = query.join("&");
        let signature = self.sign(&query);
        query = format!("{}&signature={}", query, signature);

        let url = format!("{}{}?{}", self.base_url, endpoint, query);
        let response = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| anyhow!("request failed: {}", e))?;

        self.handle_response(endpoint, response).await
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    async fn handle_response(&self, endpoint: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();

        if status == StatusCode::OK {
            self.backoff.reset(ENDPOINT_GROUP).await;
            let body = response.text().await.map_err(|e| anyhow!("read body failed: {}", e))?;
            return serde_json::from_str(&body).map_err(|e| anyhow!("parse JSON failed: {}", e));
        }

        if status.as_u16() == 429 || status.as_u16() == 418 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);

            let wait_sec = self
                .backoff
                .on_rate_limited(ENDPOINT_GROUP, status.as_u16(), retry_after)
                .await;
            warn!(
                "API rate limited: status={}, endpoint={}, wait_sec={:.1}",
                status.as_u16(),
                endpoint,
                wait_sec
            );
            return Err(anyhow!("rate limited: HTTP {}, wait {:.1}s", status.as_u16(), wait_sec));
        }

        let body = response.text().await.unwrap_or_default();
        Err(anyhow!("HTTP {}: {}", status.as_u16(), body))
    }
}

/// Binance 查询串编码（等价于标准 query escape）
fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("BTCUSDT"), "BTCUSDT");
        assert_eq!(url_encode("50000.5"), "50000.5");
        assert_eq!(url_encode("a b&c"), "a%20b%26c");
    }
}
