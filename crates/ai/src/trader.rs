//! AI 交易员
//!
//! 构造提示词（按系统提示词关键字过滤市场数据）、带重试调用提供商、
//! 解析决策 JSON；非法动作一律降级为 wait

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use nofx_core::Settings;
use nofx_domain::{
    Action, AiError, AiProvider, ChatRequest, ChatResponse, Decision, MarketData, Message, Signal,
    Store, TradeSide,
};

const MAX_RETRIES: u32 = 3;
const MAX_FIELD_CHARS: usize = 5000;
const MAX_TOTAL_BYTES: usize = 120_000;
const TRUNCATED_SUFFIX: &str = "...[truncated]";

/// 技术指标相关关键字（命中则携带指标字段）
const INDICATOR_KEYWORDS: &[&str] = &[
    "技术分析", "技术指标", "指标", "形态", "ema", "rsi", "布林", "bollinger", "bb", "cvd",
    "obv", "indicator", "pattern",
];

/// 衍生品与资金数据关键字
const DERIVATIVES_KEYWORDS: &[&str] =
    &["衍生品", "资金", "持仓", "funding", "open interest", "oi"];

pub struct AiTrader {
    provider: Arc<dyn AiProvider>,
    store: Arc<dyn Store>,
    settings: Arc<Settings>,
}

impl AiTrader {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        store: Arc<dyn Store>,
        settings: Arc<Settings>,
    ) -> Self {
        Self { provider, store, settings }
    }

    pub fn model(&self) -> String {
        self.provider.model()
    }

    /// 加载策略文档，找不到时退回内置描述
    pub fn load_strategy(&self) -> String {
        let file = &self.settings.strategy_file;
        let candidates =
            [file.clone(), format!("strategies/{}", file), format!("../strategies/{}", file)];

        for path in &candidates {
            if let Ok(content) = std::fs::read_to_string(path) {
                if !content.trim().is_empty() {
                    return content;
                }
            }
        }

        "顺势策略：基于EMA趋势、布林带、RSI等技术指标进行交易决策。".to_string()
    }

    /// 做出交易决策
    pub async fn make_decision(&self, market_data: &MarketData) -> Result<Decision> {
        let symbol = market_data.symbol.clone();
        let start = Instant::now();

        let strategy = self.load_strategy();
        let system_prompt = self.settings.ai_trader_system_prompt.clone();
        let market_json = format_market_data(market_data, &system_prompt)?;

        let user_prompt = format!(
            "策略文档：\n{}\n\n市场数据（JSON格式）：\n{}\n\n请根据策略文档和市场数据做出交易决策。请以JSON格式返回，包含以下字段：\n- action: 动作（open_long, open_short, close_long, close_short, hold, wait）\n- entry_price: 入场价格（open时）\n- stop_loss: 止损价格\n- take_profit_1: 止盈1价格\n- take_profit_2: 止盈2价格\n- reason: 决策原因",
            strategy, market_json
        );

        let req = ChatRequest {
            model: self.provider.model(),
            messages: vec![Message::system(system_prompt), Message::user(user_prompt)],
            temperature: self.settings.ai_temperature,
            max_tokens: self.settings.ai_max_tokens,
        };

        let mut response: Option<ChatResponse> = None;
        let mut last_error = String::new();

        for attempt in 1..=MAX_RETRIES {
            match self.provider.chat_completion(&req).await {
                Ok(resp) if !resp.content.is_empty() => {
                    response = Some(resp);
                    break;
                }
                Ok(_) => last_error = "空响应".to_string(),
                Err(e @ AiError::RateLimited { .. }) => {
                    // 限流也计入一次尝试
                    last_error = e.to_string();
                }
                Err(e) => last_error = e.to_string(),
            }

            if attempt < MAX_RETRIES {
                let wait = Duration::from_secs(2 * attempt as u64);
                warn!(
                    "AI API调用失败，重试中: symbol={}, attempt={}, error={}, wait={:?}",
                    symbol, attempt, last_error, wait
                );
                tokio::time::sleep(wait).await;
            }
        }

        let total_ms = start.elapsed().as_millis() as i64;

        let Some(response) = response else {
            self.write_ai_stats(&symbol, false, "wait", 0, total_ms, MAX_RETRIES, &last_error)
                .await;
            return Err(anyhow!("无法获取AI响应: {}", last_error));
        };

        let decision = match parse_ai_response(&response.content, &symbol) {
            Ok(decision) => decision,
            Err(e) => {
                self.write_ai_stats(
                    &symbol,
                    false,
                    "wait",
                    response.latency_ms,
                    total_ms,
                    MAX_RETRIES,
                    &e.to_string(),
                )
                .await;
                return Ok(Decision::wait(format!("解析AI响应失败: {}", e)));
            }
        };

        self.save_decision_history(&symbol, &decision, response.latency_ms, total_ms).await;
        self.write_ai_stats(
            &symbol,
            true,
            decision.action.as_str(),
            response.latency_ms,
            total_ms,
            1,
            "",
        )
        .await;

        info!(
            "AI交易决策完成: symbol={}, action={}, latency_ms={}",
            symbol,
            decision.action.as_str(),
            response.latency_ms
        );

        Ok(decision)
    }

    async fn write_ai_stats(
        &self,
        symbol: &str,
        ok: bool,
        action: &str,
        latency_ms: i64,
        total_ms: i64,
        attempts: u32,
        error: &str,
    ) {
        let stats = json!({
            "ts": Utc::now().timestamp(),
            "symbol": symbol,
            "ok": ok,
            "action": action,
            "model": self.provider.model(),
            "latency_ms": latency_ms,
            "total_ms": total_ms,
            "attempts": attempts,
            "error": error,
        });

        let ttl = Duration::from_secs(self.settings.ai_stats_ttl_sec.max(1) as u64);
        if let Err(e) = self.store.set("ai_api_stats", &stats.to_string(), Some(ttl)).await {
            warn!("写入AI统计失败: {}", e);
        }
    }

    async fn save_decision_history(
        &self,
        symbol: &str,
        decision: &Decision,
        latency_ms: i64,
        total_ms: i64,
    ) {
        let mut record = json!({
            "symbol": symbol,
            "action": decision.action.as_str(),
            "reason": decision.reason,
            "latency_ms": latency_ms,
            "total_ms": total_ms,
            "timestamp": Utc::now().timestamp(),
            "full_decision": decision.detail,
        });
        if let Some(signal) = &decision.signal {
            if let Ok(value) = serde_json::to_value(signal) {
                record["signal"] = value;
            }
        }

        let key = "ai_decision_history";
        let max_len = self.settings.ai_decision_history_max_len.max(1);
        if self.store.lpush(key, &record.to_string()).await.is_ok() {
            let _ = self.store.ltrim(key, 0, (max_len - 1) as isize).await;
        }
    }
}

/// 构造按系统提示词过滤的市场数据 JSON
pub fn format_market_data(market_data: &MarketData, system_prompt: &str) -> Result<String> {
    let prompt_lower = system_prompt.to_lowercase();
    let mut payload = Map::new();

    // 基础字段始终包含
    payload.insert("symbol".to_string(), json!(market_data.symbol));
    payload.insert("current_price".to_string(), json!(market_data.current_price));
    payload.insert("price_change_pct_24h".to_string(), json!(market_data.price_change_pct_24h));
    payload.insert("timestamp".to_string(), json!(market_data.timestamp));

    if contains_any(&prompt_lower, INDICATOR_KEYWORDS) {
        payload.insert("ema_20".to_string(), json!(market_data.ema_20));
        payload.insert("ema_50".to_string(), json!(market_data.ema_50));
        payload.insert("ema_200".to_string(), json!(market_data.ema_200));
        payload.insert("rsi".to_string(), json!(market_data.rsi));
        if let Some(bb) = &market_data.bb {
            payload.insert("bb".to_string(), json!(bb));
        }
        payload.insert("cvd".to_string(), json!(market_data.cvd));
        payload.insert("obv".to_string(), json!(market_data.obv));
        if let Some(pattern) = market_data.candle_pattern {
            payload.insert("candle_pattern".to_string(), json!(pattern.as_str()));
        }
    }

    if contains_any(&prompt_lower, DERIVATIVES_KEYWORDS) {
        payload.insert("funding_rate".to_string(), json!(market_data.funding_rate));
        payload.insert("open_interest".to_string(), json!(market_data.open_interest));
        payload
            .insert("open_interest_change".to_string(), json!(market_data.open_interest_change));
    }

    if let Some(account) = &market_data.account {
        payload.insert("account".to_string(), serde_json::to_value(account)?);
    }

    let payload = limit_payload(payload, MAX_FIELD_CHARS, MAX_TOTAL_BYTES);
    Ok(Value::Object(payload).to_string())
}

/// 解析 AI 响应为决策。JSON 可能被 ``` 围栏包裹；
/// 非法动作降级为 wait
pub fn parse_ai_response(content: &str, symbol: &str) -> Result<Decision> {
    let json_content = extract_json_block(content);

    let data: Value = serde_json::from_str(json_content.trim())
        .map_err(|e| anyhow!("解析JSON失败: {}", e))?;

    let action_raw = data.get("action").and_then(Value::as_str).unwrap_or("");
    let action = Action::parse_or_wait(action_raw);
    let reason = data.get("reason").and_then(Value::as_str).unwrap_or("").to_string();

    let signal = if action.is_actionable() {
        let side = match action {
            Action::OpenLong | Action::CloseLong => TradeSide::Long,
            _ => TradeSide::Short,
        };
        let mut signal = Signal::new(symbol, action, side);
        if action.is_open() {
            signal.entry_price = get_f64(&data, "entry_price");
            signal.stop_loss = get_f64(&data, "stop_loss");
            signal.take_profit = get_f64(&data, "take_profit_1");
            signal.take_profit_2 = get_f64(&data, "take_profit_2");
        }
        signal.reason = reason.clone();
        Some(signal)
    } else {
        None
    };

    Ok(Decision { action, signal, reason, detail: data })
}

/// 提取 ```json ... ``` 或 ``` ... ``` 围栏内的内容
fn extract_json_block(content: &str) -> &str {
    for fence in ["```json", "```"] {
        if let Some(start) = content.find(fence) {
            let rest = &content[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
        }
    }
    content
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

fn get_f64(data: &Value, key: &str) -> f64 {
    match data.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// 限制负载大小：超长字符串按字符边界截断；
/// 总量仍超限时从非核心字段里删最大的
fn limit_payload(mut payload: Map<String, Value>, max_field_chars: usize, max_total_bytes: usize) -> Map<String, Value> {
    for (_, value) in payload.iter_mut() {
        if let Value::String(s) = value {
            if s.len() > max_field_chars {
                let mut end = max_field_chars;
                while end > 0 && !s.is_char_boundary(end) {
                    end -= 1;
                }
                *value = Value::String(format!("{}{}", &s[..end], TRUNCATED_SUFFIX));
            }
        }
    }

    const CORE_FIELDS: &[&str] = &["symbol", "current_price", "price_change_pct_24h", "timestamp"];
    while Value::Object(payload.clone()).to_string().len() > max_total_bytes {
        let largest = payload
            .iter()
            .filter(|(k, _)| !CORE_FIELDS.contains(&k.as_str()))
            .max_by_key(|(_, v)| v.to_string().len())
            .map(|(k, _)| k.clone());
        match largest {
            Some(key) => {
                payload.remove(&key);
            }
            None => break,
        }
    }

    payload
}
