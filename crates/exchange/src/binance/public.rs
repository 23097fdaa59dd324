//! 公共行情端点

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::info;

use nofx_domain::{MarketInfo, Ohlcv, Ticker24h};

use super::{value_f64, value_i64, BinanceExchange};

impl BinanceExchange {
    pub(crate) async fn fetch_klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Ohlcv>> {
        let symbol = Self::normalize_symbol(symbol);
        let cache_key = format!("ohlcv:{}:{}:{}", symbol, timeframe, limit);

        {
            let cache = self.kline_cache.read().await;
            if let Some((data, at)) = cache.get(&cache_key) {
                if at.elapsed() < self.cache_ttl() {
                    return Ok(data.clone());
                }
            }
        }

        let data = self
            .http
            .fetch_json(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.clone()),
                    ("interval", timeframe.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await
            .map_err(|e| anyhow!("failed to get OHLCV: {}", e))?;

        let klines = data.as_array().ok_or_else(|| anyhow!("invalid klines data format"))?;

        let mut result = Vec::with_capacity(klines.len());
        for k in klines {
            if let Some(fields) = k.as_array() {
                if fields.len() >= 6 {
                    result.push(Ohlcv {
                        time: value_i64(&fields[0]).unwrap_or(0),
                        open: value_f64(&fields[1]),
                        high: value_f64(&fields[2]),
                        low: value_f64(&fields[3]),
                        close: value_f64(&fields[4]),
                        volume: value_f64(&fields[5]),
                    });
                }
            }
        }

        let mut cache = self.kline_cache.write().await;
        cache.insert(cache_key, (result.clone(), Instant::now()));

        Ok(result)
    }

    pub(crate) async fn fetch_ticker_price(&self, symbol: &str) -> Result<f64> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .http
            .fetch_json("/fapi/v1/ticker/price", &[("symbol", symbol)])
            .await
            .map_err(|e| anyhow!("failed to get ticker price: {}", e))?;

        match data.get("price") {
            Some(price) => Ok(value_f64(price)),
            None => Err(anyhow!("invalid ticker data format")),
        }
    }

    pub(crate) async fn fetch_ticker_24h(&self, symbol: &str) -> Result<Ticker24h> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .http
            .fetch_json("/fapi/v1/ticker/24hr", &[("symbol", symbol)])
            .await
            .map_err(|e| anyhow!("failed to get 24h ticker: {}", e))?;

        if !data.is_object() {
            return Err(anyhow!("invalid ticker data format"));
        }

        Ok(Ticker24h {
            last_price: data.get("lastPrice").map(value_f64).unwrap_or(0.0),
            price_change_percent: data.get("priceChangePercent").map(value_f64).unwrap_or(0.0),
            quote_volume: data.get("quoteVolume").map(value_f64).unwrap_or(0.0),
        })
    }

    pub(crate) async fn fetch_funding_rate(&self, symbol: &str) -> Result<f64> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .http
            .fetch_json("/fapi/v1/premiumIndex", &[("symbol", symbol)])
            .await
            .map_err(|e| anyhow!("failed to get funding rate: {}", e))?;

        match data.get("lastFundingRate") {
            Some(rate) => Ok(value_f64(rate)),
            None => Err(anyhow!("invalid funding rate data format")),
        }
    }

    pub(crate) async fn fetch_open_interest(&self, symbol: &str) -> Result<f64> {
        let symbol = Self::normalize_symbol(symbol);
        let data = self
            .http
            .fetch_json("/fapi/v1/openInterest", &[("symbol", symbol)])
            .await
            .map_err(|e| anyhow!("failed to get open interest: {}", e))?;

        match data.get("openInterest") {
            Some(oi) => Ok(value_f64(oi)),
            None => Err(anyhow!("invalid open interest data format")),
        }
    }

    pub(crate) async fn fetch_usdt_perpetual_symbols(&self) -> Result<Vec<String>> {
        let markets = self.load_markets().await?;
        let mut symbols: Vec<String> = markets
            .iter()
            .filter(|(_, m)| {
                m.get("quoteAsset").and_then(Value::as_str) == Some("USDT")
                    && m.get("contractType").and_then(Value::as_str) == Some("PERPETUAL")
            })
            .map(|(s, _)| s.clone())
            .collect();
        symbols.sort();
        Ok(symbols)
    }

    pub(crate) async fn fetch_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        let symbol = Self::normalize_symbol(symbol);
        let markets = self.load_markets().await?;
        let market = markets
            .get(&symbol)
            .ok_or_else(|| anyhow!("market info not found for symbol: {}", symbol))?;

        // PRICE_FILTER 里的 tickSize 优先，precision 兜底
        let tick_size = market
            .get("filters")
            .and_then(Value::as_array)
            .and_then(|filters| {
                filters.iter().find(|f| {
                    f.get("filterType").and_then(Value::as_str) == Some("PRICE_FILTER")
                })
            })
            .and_then(|f| f.get("tickSize"))
            .map(value_f64)
            .filter(|v| *v > 0.0);

        Ok(MarketInfo {
            symbol: symbol.clone(),
            onboard_date: market.get("onboardDate").and_then(value_i64),
            tick_size,
            price_precision: market
                .get("pricePrecision")
                .and_then(value_i64)
                .map(|p| p as u32),
        })
    }

    /// 懒加载 exchangeInfo 并按 symbol 建索引
    async fn load_markets(&self) -> Result<HashMap<String, Value>> {
        {
            let markets = self.markets.read().await;
            if let Some(markets) = markets.as_ref() {
                return Ok(markets.clone());
            }
        }

        let data = self
            .http
            .fetch_json("/fapi/v1/exchangeInfo", &[])
            .await
            .map_err(|e| anyhow!("failed to load markets: {}", e))?;

        let mut map = HashMap::new();
        if let Some(symbols) = data.get("symbols").and_then(Value::as_array) {
            for sym in symbols {
                if let Some(name) = sym.get("symbol").and_then(Value::as_str) {
                    map.insert(name.to_string(), sym.clone());
                }
            }
        }

        info!("Markets loaded: count={}", map.len());

        let mut markets = self.markets.write().await;
        *markets = Some(map.clone());
        Ok(map)
    }
}
