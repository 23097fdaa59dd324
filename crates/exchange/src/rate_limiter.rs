//! 令牌桶限流 + 429/418 指数退避

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// 令牌桶限流器：按墙钟流逝补充令牌
pub struct RateLimiter {
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_update: Instant,
}

impl RateLimiter {
    pub fn new(rate: f64, capacity: u32) -> Self {
        Self {
            rate,
            capacity: capacity as f64,
            state: Mutex::new(BucketState { tokens: capacity as f64, last_update: Instant::now() }),
        }
    }

    /// 尝试消费 n 个令牌
    pub fn acquire(&self, tokens: u32) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_update = now;

        if state.tokens >= tokens as f64 {
            state.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }

    /// 等待直到拿到令牌，单次睡眠限制在 [0.1, 1.0] 秒
    pub async fn wait(&self, tokens: u32) {
        while !self.acquire(tokens) {
            let deficit = {
                let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                tokens as f64 - state.tokens
            };
            let wait_sec = (deficit / self.rate).clamp(0.1, 1.0);
            tokio::time::sleep(Duration::from_secs_f64(wait_sec)).await;
        }
    }
}

const MAX_BACKOFF_LEVEL: u32 = 6;
const MAX_BACKOFF_SEC: f64 = 60.0;

/// 按端点组维护 (释放时刻, 连续失败级别) 的退避管理器
#[derive(Default)]
pub struct BackoffManager {
    backoff_until: RwLock<HashMap<String, Instant>>,
    backoff_level: RwLock<HashMap<String, u32>>,
}

impl BackoffManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 阻塞到退避窗口结束，每次最多睡 1 秒
    pub async fn wait_backoff(&self, endpoint: &str) {
        loop {
            let until = { self.backoff_until.read().await.get(endpoint).copied() };
            match until {
                Some(until) if until > Instant::now() => {
                    let wait = until.duration_since(Instant::now()).min(Duration::from_secs(1));
                    tokio::time::sleep(wait).await;
                }
                _ => return,
            }
        }
    }

    /// 设置退避窗口，只会延后不会提前
    pub async fn set_backoff(&self, endpoint: &str, wait_sec: f64) {
        if wait_sec <= 0.0 {
            return;
        }
        let until = Instant::now() + Duration::from_secs_f64(wait_sec);
        let mut map = self.backoff_until.write().await;
        let entry = map.entry(endpoint.to_string()).or_insert(until);
        if until > *entry {
            *entry = until;
        }
    }

    /// 成功后清除退避
    pub async fn reset(&self, endpoint: &str) {
        self.backoff_until.write().await.remove(endpoint);
        self.backoff_level.write().await.insert(endpoint.to_string(), 0);
    }

    /// 处理限流响应（429/418），返回建议等待秒数。
    /// 无 Retry-After 时按 base × 2^level 退避：429 base=1s，418 base=60s，
    /// 上限 60s；另加 0.1×wait（≤1s）的抖动错开恢复时刻
    pub async fn on_rate_limited(
        &self,
        endpoint: &str,
        status: u16,
        retry_after: Option<f64>,
    ) -> f64 {
        let level = {
            let mut levels = self.backoff_level.write().await;
            let entry = levels.entry(endpoint.to_string()).or_insert(0);
            let level = *entry;
            *entry = (level + 1).min(MAX_BACKOFF_LEVEL);
            level
        };

        let mut wait_sec = match retry_after {
            Some(sec) => sec,
            None => {
                let base = if status == 418 { 60.0 } else { 1.0 };
                let exp = level.min(MAX_BACKOFF_LEVEL);
                (base * 2f64.powi(exp as i32)).min(MAX_BACKOFF_SEC)
            }
        };

        wait_sec = wait_sec.clamp(1.0, MAX_BACKOFF_SEC);
        wait_sec += (0.1 * wait_sec).min(1.0);

        self.set_backoff(endpoint, wait_sec).await;
        wait_sec
    }
}

/// 解析 Retry-After 头：秒数或 RFC1123 日期，负值视为无效
pub fn parse_retry_after(value: &str) -> Option<f64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(sec) = value.parse::<f64>() {
        return (sec >= 0.0).then_some(sec);
    }

    if let Ok(when) = DateTime::parse_from_rfc2822(value) {
        let wait = (when.with_timezone(&Utc) - Utc::now()).num_milliseconds() as f64 / 1000.0;
        return (wait >= 0.0).then_some(wait);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket_drains_and_refills() {
        let limiter = RateLimiter::new(1000.0, 5);
        for _ in 0..5 {
            assert!(limiter.acquire(1));
        }
        assert!(!limiter.acquire(1));
        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.acquire(1));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("3"), Some(3.0));
        assert_eq!(parse_retry_after("2.5"), Some(2.5));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after(""), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let future = (Utc::now() + chrono::Duration::seconds(30)).to_rfc2822();
        let wait = parse_retry_after(&future).expect("future date should parse");
        assert!(wait > 25.0 && wait <= 30.5, "wait={}", wait);

        let past = (Utc::now() - chrono::Duration::seconds(30)).to_rfc2822();
        assert_eq!(parse_retry_after(&past), None);
    }

    #[tokio::test]
    async fn test_backoff_escalation_and_reset() {
        let bm = BackoffManager::new();

        // Retry-After 优先，加 10% 抖动
        let wait = bm.on_rate_limited("exchange", 429, Some(3.0)).await;
        assert!((wait - 3.3).abs() < 1e-9, "wait={}", wait);

        // level 已升到 1：2^1 = 2s (+10%)
        let wait = bm.on_rate_limited("exchange", 429, None).await;
        assert!((wait - 2.2).abs() < 1e-9, "wait={}", wait);

        // 418 基数 60s，触顶 60 (+1s 抖动上限)
        let wait = bm.on_rate_limited("exchange", 418, None).await;
        assert!((wait - 61.0).abs() < 1e-9, "wait={}", wait);

        bm.reset("exchange").await;
        // 重置后 429 从 2^0 = 1s 重新开始
        let wait = bm.on_rate_limited("exchange", 429, None).await;
        assert!((wait - 1.1).abs() < 1e-9, "wait={}", wait);
    }

    #[tokio::test]
    async fn test_wait_backoff_blocks_until_window() {
        let bm = BackoffManager::new();
        bm.set_backoff("exchange", 0.05).await;
        let start = Instant::now();
        bm.wait_backoff("exchange").await;
        assert!(start.elapsed() >= Duration::from_millis(45));

        // 无退避时立即返回
        let start = Instant::now();
        bm.wait_backoff("other").await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
