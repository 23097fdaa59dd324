//! Binance USDⓈ-M 永续合约实现

pub mod account;
pub mod orders;
pub mod public;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use nofx_core::Settings;
use nofx_domain::{
    Balance, Exchange, MarketInfo, Ohlcv, Order, OrderRequest, Position, Ticker24h,
};

use crate::http_client::HttpClient;

pub struct BinanceExchange {
    pub(crate) http: HttpClient,
    pub(crate) settings: Arc<Settings>,
    /// K线短缓存，减少同一周期内的重复拉取
    pub(crate) kline_cache: RwLock<HashMap<String, (Vec<Ohlcv>, Instant)>>,
    /// exchangeInfo 原始条目，懒加载
    pub(crate) markets: RwLock<Option<HashMap<String, Value>>>,
}

impl BinanceExchange {
    pub fn new(settings: Arc<Settings>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(&settings)?,
            settings,
            kline_cache: RwLock::new(HashMap::new()),
            markets: RwLock::new(None),
        })
    }

    /// 规范化交易对符号：大写、去分隔符、补 USDT 后缀
    pub fn normalize_symbol(symbol: &str) -> String {
        let mut s: String = symbol
            .trim()
            .to_uppercase()
            .chars()
            .filter(|c| !matches!(c, '/' | '-' | '_'))
            .collect();
        if !s.ends_with("USDT") {
            s.push_str("USDT");
        }
        s
    }

    pub(crate) fn cache_ttl(&self) -> Duration {
        Duration::from_secs_f64(self.settings.exchange_cache_ttl_sec.max(0.0))
    }
}

/// 宽松取数：交易所各端点会在字符串和数字之间摇摆
pub(crate) fn value_f64(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

pub(crate) fn value_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn value_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl Exchange for BinanceExchange {
    async fn get_klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Ohlcv>> {
        self.fetch_klines(symbol, timeframe, limit).await
    }

    async fn get_ticker_price(&self, symbol: &str) -> Result<f64> {
        self.fetch_ticker_price(symbol).await
    }

    async fn get_ticker_24h(&self, symbol: &str) -> Result<Ticker24h> {
        self.fetch_ticker_24h(symbol).await
    }

    async fn get_funding_rate(&self, symbol: &str) -> Result<f64> {
        self.fetch_funding_rate(symbol).await
    }

    async fn get_open_interest(&self, symbol: &str) -> Result<f64> {
        self.fetch_open_interest(symbol).await
    }

    async fn get_usdt_perpetual_symbols(&self) -> Result<Vec<String>> {
        self.fetch_usdt_perpetual_symbols().await
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        self.fetch_market_info(symbol).await
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<Order> {
        self.submit_order(req).await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.submit_cancel(symbol, order_id).await
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        self.fetch_order(symbol, order_id).await
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        self.fetch_open_orders(symbol).await
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        let symbol = Self::normalize_symbol(symbol);
        let positions = self.get_positions().await?;
        Ok(positions.into_iter().find(|p| p.symbol == symbol))
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        self.fetch_positions().await
    }

    async fn get_balance(&self) -> Result<Balance> {
        self.fetch_balance().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(BinanceExchange::normalize_symbol("btcusdt"), "BTCUSDT");
        assert_eq!(BinanceExchange::normalize_symbol("BTC/USDT"), "BTCUSDT");
        assert_eq!(BinanceExchange::normalize_symbol(" eth-usdt "), "ETHUSDT");
        assert_eq!(BinanceExchange::normalize_symbol("SOL"), "SOLUSDT");
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(value_f64(&serde_json::json!("1.5")), 1.5);
        assert_eq!(value_f64(&serde_json::json!(2)), 2.0);
        assert_eq!(value_f64(&serde_json::json!(null)), 0.0);
        assert_eq!(value_i64(&serde_json::json!("1699999999999")), Some(1699999999999));
        assert_eq!(value_str(&serde_json::json!(42)), "42");
    }
}
