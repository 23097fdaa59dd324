//! 扫描器集成测试：指标归属周期、OI 变化、快照落库、核心周期失败、
//! 流式扫描与币种池

use std::collections::{HashMap, HashSet};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use nofx_core::cache::MemoryStore;
use nofx_core::{Settings, TradeContext};
use nofx_domain::{
    Balance, Exchange, MarketData, MarketInfo, Ohlcv, Order, OrderRequest, Position, Store,
    Ticker24h,
};
use nofx_indicators::{calculate_ema, calculate_rsi};
use nofx_market::Scanner;

fn bars(n: usize, start: f64, step: f64) -> Vec<Ohlcv> {
    (0..n)
        .map(|i| {
            let close = start + step * i as f64;
            Ohlcv {
                open: close - step / 2.0,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0 + i as f64,
                time: i as i64 * 60_000,
            }
        })
        .collect()
}

struct ScriptedExchange {
    klines: HashMap<String, Vec<Ohlcv>>,
    fail_timeframes: HashSet<String>,
    oi: Mutex<f64>,
    symbols: Vec<String>,
    market_infos: HashMap<String, MarketInfo>,
}

impl ScriptedExchange {
    fn new() -> Self {
        let mut klines = HashMap::new();
        klines.insert("1m".to_string(), bars(50, 100.0, 0.0));
        klines.insert("3m".to_string(), bars(50, 100.0, 0.0));
        klines.insert("5m".to_string(), bars(50, 100.0, 0.1));
        klines.insert("15m".to_string(), bars(200, 100.0, 0.1));
        klines.insert("30m".to_string(), bars(100, 100.0, 0.1));
        klines.insert("1h".to_string(), bars(200, 100.0, 0.5));
        klines.insert("4h".to_string(), bars(200, 100.0, 1.0));
        klines.insert("1d".to_string(), bars(200, 100.0, 2.0));
        Self {
            klines,
            fail_timeframes: HashSet::new(),
            oi: Mutex::new(100.0),
            symbols: Vec::new(),
            market_infos: HashMap::new(),
        }
    }

    fn failing(timeframe: &str) -> Self {
        let mut ex = Self::new();
        ex.fail_timeframes.insert(timeframe.to_string());
        ex
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn get_klines(&self, _: &str, timeframe: &str, _: usize) -> Result<Vec<Ohlcv>> {
        if self.fail_timeframes.contains(timeframe) {
            return Err(anyhow!("timeframe {} unavailable", timeframe));
        }
        Ok(self.klines.get(timeframe).cloned().unwrap_or_default())
    }

    async fn get_ticker_price(&self, _: &str) -> Result<f64> {
        Ok(100.0)
    }

    async fn get_ticker_24h(&self, _: &str) -> Result<Ticker24h> {
        Ok(Ticker24h { last_price: 100.0, price_change_percent: 3.5, quote_volume: 1e6 })
    }

    async fn get_funding_rate(&self, _: &str) -> Result<f64> {
        Ok(0.0001)
    }

    async fn get_open_interest(&self, _: &str) -> Result<f64> {
        Ok(*self.oi.lock().unwrap())
    }

    async fn get_usdt_perpetual_symbols(&self) -> Result<Vec<String>> {
        Ok(self.symbols.clone())
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        self.market_infos
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no market info for {}", symbol))
    }

    async fn place_order(&self, _: &OrderRequest) -> Result<Order> {
        anyhow::bail!("not used")
    }

    async fn cancel_order(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }

    async fn get_order(&self, _: &str, _: &str) -> Result<Order> {
        anyhow::bail!("not used")
    }

    async fn get_open_orders(&self, _: &str) -> Result<Vec<Order>> {
        Ok(Vec::new())
    }

    async fn get_position(&self, _: &str) -> Result<Option<Position>> {
        Ok(None)
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(Vec::new())
    }

    async fn get_balance(&self) -> Result<Balance> {
        Ok(Balance::default())
    }
}

fn build_scanner(exchange: Arc<ScriptedExchange>) -> (Scanner, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ctx = TradeContext::new(
        store.clone() as Arc<dyn Store>,
        exchange as Arc<dyn Exchange>,
        Arc::new(Settings::from_env()),
    );
    (Scanner::new(ctx), store)
}

#[tokio::test]
async fn test_scan_symbol_indicator_timeframes() {
    let exchange = Arc::new(ScriptedExchange::new());
    let (scanner, store) = build_scanner(exchange.clone());

    let md = scanner.scan_symbol("BTCUSDT").await.unwrap();

    assert_eq!(md.symbol, "BTCUSDT");
    assert_eq!(md.current_price, 100.0);
    assert_eq!(md.price_change_pct_24h, 3.5);
    assert_eq!(md.funding_rate, 0.0001);

    // EMA20/EMA50 来自 3m 收盘价（常数序列 -> 均为 100）
    let closes_3m: Vec<f64> =
        exchange.klines.get("3m").unwrap().iter().map(|c| c.close).collect();
    assert_eq!(md.ema_20, calculate_ema(&closes_3m, 20));
    assert_eq!(md.ema_20, 100.0);

    // EMA200 / RSI 来自 1h 收盘价（严格递增 -> RSI=100）
    let closes_1h: Vec<f64> =
        exchange.klines.get("1h").unwrap().iter().map(|c| c.close).collect();
    assert_eq!(md.ema_200, calculate_ema(&closes_1h, 200));
    assert!(md.ema_200 > 0.0);
    assert_eq!(md.rsi, calculate_rsi(&closes_1h, 14));
    assert_eq!(md.rsi, 100.0);

    let bb = md.bb.expect("bb missing");
    assert!(bb.upper >= bb.middle && bb.middle >= bb.lower);

    // 快照已落库
    let snapshot = store.get("market_snapshot:BTCUSDT").await.unwrap().expect("no snapshot");
    let parsed: MarketData = serde_json::from_str(&snapshot).unwrap();
    assert_eq!(parsed.symbol, "BTCUSDT");
    assert_eq!(parsed.ohlcv_1h.len(), 200);
}

#[tokio::test]
async fn test_oi_change_needs_prior_sample() {
    let exchange = Arc::new(ScriptedExchange::new());
    let (scanner, _) = build_scanner(exchange.clone());

    // 第一次扫描：没有历史 OI，变化为 0
    let first = scanner.scan_symbol("BTCUSDT").await.unwrap();
    assert_eq!(first.open_interest_change, 0.0);

    // OI 从 100 涨到 110：+10%
    *exchange.oi.lock().unwrap() = 110.0;
    let second = scanner.scan_symbol("BTCUSDT").await.unwrap();
    assert!((second.open_interest_change - 10.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_core_timeframe_failure_aborts_symbol() {
    for tf in ["1m", "3m", "15m"] {
        let exchange = Arc::new(ScriptedExchange::failing(tf));
        let (scanner, _) = build_scanner(exchange);
        let result = scanner.scan_symbol("BTCUSDT").await;
        assert!(result.is_err(), "{} failure must abort", tf);
    }
}

#[tokio::test]
async fn test_secondary_timeframe_failure_degrades() {
    let exchange = Arc::new(ScriptedExchange::failing("4h"));
    let (scanner, _) = build_scanner(exchange);

    let md = scanner.scan_symbol("BTCUSDT").await.expect("4h failure must not abort");
    assert!(md.ohlcv_4h.is_empty());
    // 其他周期的指标照常
    assert_eq!(md.ema_20, 100.0);
}

#[tokio::test]
async fn test_scan_stream_yields_all_and_closes() {
    let exchange = Arc::new(ScriptedExchange::new());
    let (scanner, store) = build_scanner(exchange);

    let pool: Vec<String> =
        ["AAAUSDT", "BBBUSDT", "CCCUSDT"].iter().map(|s| s.to_string()).collect();
    store.sadd("volatility_pool", &pool).await.unwrap();

    let mut rx = scanner
        .scan_stream(false, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap();

    let mut seen = Vec::new();
    while let Some(md) = rx.recv().await {
        seen.push(md.symbol);
    }
    seen.sort();
    assert_eq!(seen, vec!["AAAUSDT", "BBBUSDT", "CCCUSDT"]);
}

#[tokio::test]
async fn test_scan_collected_updates_symbol_pool() {
    let exchange = Arc::new(ScriptedExchange::new());
    let (scanner, store) = build_scanner(exchange);

    store.sadd("volatility_pool", &["AAAUSDT".to_string()]).await.unwrap();

    let results =
        scanner.scan_collected(false, Arc::new(AtomicBool::new(false))).await.unwrap();
    assert_eq!(results.len(), 1);

    let pool = store.smembers("symbol_pool").await.unwrap();
    assert_eq!(pool, vec!["AAAUSDT"]);
}

#[tokio::test]
async fn test_get_pool_filters_young_symbols() {
    let mut exchange = ScriptedExchange::new();
    let now_ms = Utc::now().timestamp_millis();

    exchange.symbols =
        vec!["OLDUSDT".to_string(), "NEWUSDT".to_string(), "UNKNOWNUSDT".to_string()];
    exchange.market_infos.insert(
        "OLDUSDT".to_string(),
        MarketInfo {
            symbol: "OLDUSDT".to_string(),
            onboard_date: Some(now_ms - 90 * 86_400_000),
            tick_size: None,
            price_precision: None,
        },
    );
    exchange.market_infos.insert(
        "NEWUSDT".to_string(),
        MarketInfo {
            symbol: "NEWUSDT".to_string(),
            onboard_date: Some(now_ms - 5 * 86_400_000),
            tick_size: None,
            price_precision: None,
        },
    );
    // UNKNOWNUSDT 没有元信息：保守保留

    let (scanner, _) = build_scanner(Arc::new(exchange));

    let pool = scanner.get_pool(true).await.unwrap();
    assert!(pool.contains(&"OLDUSDT".to_string()));
    assert!(!pool.contains(&"NEWUSDT".to_string()));
    assert!(pool.contains(&"UNKNOWNUSDT".to_string()));
}

#[tokio::test]
async fn test_get_pool_prefers_volatility_pool() {
    let mut exchange = ScriptedExchange::new();
    exchange.symbols = vec!["FULLUSDT".to_string()];
    let (scanner, store) = build_scanner(Arc::new(exchange));

    store.sadd("volatility_pool", &["HOTUSDT".to_string()]).await.unwrap();

    // 非强制全量：用波动率池
    assert_eq!(scanner.get_pool(false).await.unwrap(), vec!["HOTUSDT"]);

    // 强制全量：绕过波动率池
    assert_eq!(scanner.get_pool(true).await.unwrap(), vec!["FULLUSDT"]);
}
