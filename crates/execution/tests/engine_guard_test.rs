//! 执行引擎与守护的集成测试：去重、锁竞争、SL/TP 补挂、孤儿清理

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use nofx_core::cache::MemoryStore;
use nofx_core::{Settings, TradeContext};
use nofx_domain::{
    Action, Balance, Exchange, MarketInfo, Ohlcv, Order, OrderRequest, OrderSide, OrderStatus,
    OrderType, Position, PositionSide, Signal, Store, Ticker24h, TradeSide,
};
use nofx_execution::ExecutionEngine;

/// 可注入持仓与挂单的交易所测试替身，记录所有下单与撤单
#[derive(Default)]
struct MockExchange {
    positions: Mutex<Vec<Position>>,
    open_orders: Mutex<HashMap<String, Vec<Order>>>,
    placed: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
}

impl MockExchange {
    fn with_position(symbol: &str, side: PositionSide, size: f64) -> Self {
        let mock = Self::default();
        mock.positions.lock().unwrap().push(Position {
            symbol: symbol.to_string(),
            side,
            size,
            entry_price: 50000.0,
            mark_price: 50000.0,
            unrealized_pnl: 0.0,
            leverage: 5,
        });
        mock
    }

    fn add_open_order(&self, order: Order) {
        self.open_orders.lock().unwrap().entry(order.symbol.clone()).or_default().push(order);
    }

    fn placed_requests(&self) -> Vec<OrderRequest> {
        self.placed.lock().unwrap().clone()
    }

    fn cancelled_ids(&self) -> Vec<(String, String)> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn get_klines(&self, _: &str, _: &str, _: usize) -> Result<Vec<Ohlcv>> {
        Ok(Vec::new())
    }

    async fn get_ticker_price(&self, _: &str) -> Result<f64> {
        Ok(50000.0)
    }

    async fn get_ticker_24h(&self, _: &str) -> Result<Ticker24h> {
        Ok(Ticker24h::default())
    }

    async fn get_funding_rate(&self, _: &str) -> Result<f64> {
        Ok(0.0)
    }

    async fn get_open_interest(&self, _: &str) -> Result<f64> {
        Ok(0.0)
    }

    async fn get_usdt_perpetual_symbols(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo> {
        Err(anyhow!("no market info for {}", symbol))
    }

    async fn place_order(&self, req: &OrderRequest) -> Result<Order> {
        let id = format!("mock_{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let order = Order {
            id: id.clone(),
            symbol: req.symbol.clone(),
            side: req.side,
            position_side: req.position_side,
            order_type: req.order_type,
            quantity: req.quantity,
            price: req.price.unwrap_or(0.0),
            stop_price: req.stop_price.unwrap_or(0.0),
            status: OrderStatus::New,
            filled_qty: 0.0,
            avg_price: 0.0,
            reduce_only: req.reduce_only,
            timestamp: 0,
        };

        self.placed.lock().unwrap().push(req.clone());
        if req.reduce_only {
            self.add_open_order(order.clone());
        }
        Ok(order)
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.cancelled.lock().unwrap().push((symbol.to_string(), order_id.to_string()));
        if let Some(orders) = self.open_orders.lock().unwrap().get_mut(symbol) {
            orders.retain(|o| o.id != order_id);
        }
        Ok(())
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        Ok(Order {
            id: order_id.to_string(),
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            position_side: PositionSide::Long,
            order_type: OrderType::Limit,
            quantity: 0.0,
            price: 0.0,
            stop_price: 0.0,
            status: OrderStatus::Filled,
            filled_qty: 0.0,
            avg_price: 0.0,
            reduce_only: false,
            timestamp: 0,
        })
    }

    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        Ok(self.open_orders.lock().unwrap().get(symbol).cloned().unwrap_or_default())
    }

    async fn get_position(&self, symbol: &str) -> Result<Option<Position>> {
        Ok(self.positions.lock().unwrap().iter().find(|p| p.symbol == symbol).cloned())
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.positions.lock().unwrap().clone())
    }

    async fn get_balance(&self) -> Result<Balance> {
        Ok(Balance { total: 10000.0, free: 10000.0, used: 0.0 })
    }
}

fn test_settings() -> Settings {
    let mut settings = Settings::from_env();
    // 去重窗口放大，避免测试过程中跨越窗口边界
    settings.order_dedupe_window_sec = 3600;
    settings.tp1_partial_ratio = 0.5;
    settings
}

fn build_engine(exchange: Arc<MockExchange>) -> (ExecutionEngine, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let ctx = TradeContext::new(
        store.clone() as Arc<dyn Store>,
        exchange as Arc<dyn Exchange>,
        Arc::new(test_settings()),
    );
    (ExecutionEngine::new(ctx, Arc::new(AtomicBool::new(false))), store)
}

fn open_long_signal(symbol: &str, entry: f64) -> Signal {
    let mut signal = Signal::new(symbol, Action::OpenLong, TradeSide::Long);
    signal.entry_price = entry;
    signal.stop_loss = entry * 0.96;
    signal.take_profit = entry * 1.04;
    signal.assign_id();
    signal
}

async fn audit_events(store: &MemoryStore, event: &str) -> Vec<serde_json::Value> {
    store
        .lrange("order_audit", 0, -1)
        .await
        .unwrap()
        .iter()
        .filter_map(|row| serde_json::from_str::<serde_json::Value>(row).ok())
        .filter(|v| v["event"] == event)
        .collect()
}

/// S1: 同一窗口内的重复信号只执行一次
#[tokio::test(start_paused = true)]
async fn test_dedupe_within_window() {
    let exchange = Arc::new(MockExchange::default());
    let (engine, store) = build_engine(exchange.clone());

    let signal = open_long_signal("BTCUSDT", 50000.0);

    let first = engine.place_order_from_signal(&signal).await;
    assert!(first.ok, "first: {}", first.reason);
    assert!(first.order.is_some());

    let mut second_signal = open_long_signal("BTCUSDT", 50000.0);
    second_signal.assign_id();
    let second = engine.place_order_from_signal(&second_signal).await;
    assert!(!second.ok);
    assert_eq!(second.reason, "duplicate");
    assert!(second.order.is_none());

    assert_eq!(audit_events(&store, "order_placed").await.len(), 1);
    assert_eq!(exchange.placed_requests().len(), 1);
}

/// S2: 并发下单同一币种，恰好一个成功、另一个锁竞争失败
#[tokio::test(start_paused = true)]
async fn test_lock_contention() {
    let exchange = Arc::new(MockExchange::default());
    let (engine, store) = build_engine(exchange.clone());

    let a = {
        let engine = engine.clone();
        let signal = open_long_signal("BTCUSDT", 50000.0);
        tokio::spawn(async move { engine.place_order_from_signal(&signal).await })
    };
    let b = {
        let engine = engine.clone();
        let signal = open_long_signal("BTCUSDT", 50000.0);
        tokio::spawn(async move { engine.place_order_from_signal(&signal).await })
    };

    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.ok != b.ok, "exactly one must succeed: a={:?}, b={:?}", a.reason, b.reason);
    let loser = if a.ok { &b } else { &a };
    assert_eq!(loser.reason, "lock contended");

    // order_placed 审计不重复
    assert_eq!(audit_events(&store, "order_placed").await.len(), 1);
}

/// 开仓成功后保护信息落库
#[tokio::test(start_paused = true)]
async fn test_protection_saved_after_entry() {
    let exchange = Arc::new(MockExchange::default());
    let (engine, store) = build_engine(exchange);

    let signal = open_long_signal("ETHUSDT", 2500.0);
    let result = engine.place_order_from_signal(&signal).await;
    assert!(result.ok);

    let json = store.get("protection:ETHUSDT:LONG").await.unwrap().expect("protection missing");
    let protection: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(protection["stop_loss"].as_f64().unwrap(), 2500.0 * 0.96);
    assert_eq!(protection["tp1_ratio"].as_f64().unwrap(), 0.5);
    assert_eq!(protection["signal_id"].as_str().unwrap(), signal.signal_id);
}

/// 入场价缺失的开仓信号直接拒绝，不触网
#[tokio::test(start_paused = true)]
async fn test_invalid_entry_rejected() {
    let exchange = Arc::new(MockExchange::default());
    let (engine, _) = build_engine(exchange.clone());

    let mut signal = Signal::new("BTCUSDT", Action::OpenLong, TradeSide::Long);
    signal.assign_id();
    let result = engine.place_order_from_signal(&signal).await;
    assert!(!result.ok);
    assert_eq!(result.reason, "invalid entry price");
    assert!(exchange.placed_requests().is_empty());
}

/// S3: 守护为裸持仓补挂 SL 与 TP1（tp2 未设置时 TP1 覆盖全仓）
#[tokio::test(start_paused = true)]
async fn test_guard_provisions_sl_and_tp1() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 1.0));
    let (engine, store) = build_engine(exchange.clone());

    let protection = serde_json::json!({
        "stop_loss": 48000.0,
        "take_profit_1": 52000.0,
        "take_profit_2": 0.0,
        "tp1_ratio": 0.5,
        "signal_id": "sig-1",
        "timestamp": 0,
    });
    store.set("protection:BTCUSDT:LONG", &protection.to_string(), None).await.unwrap();

    engine.ensure_sltp_guard_once("10s").await;

    let placed = exchange.placed_requests();
    assert_eq!(placed.len(), 2, "placed={:?}", placed);

    let sl = placed.iter().find(|r| r.order_type == OrderType::StopMarket).expect("no SL");
    assert_eq!(sl.side, OrderSide::Sell);
    assert_eq!(sl.quantity, 1.0);
    assert_eq!(sl.stop_price, Some(48000.0));
    assert!(sl.reduce_only);

    let tp = placed
        .iter()
        .find(|r| r.order_type == OrderType::TakeProfitMarket)
        .expect("no TP");
    assert_eq!(tp.side, OrderSide::Sell);
    // amt1 本为 0.5，但 TP2 不挂，TP1 覆盖全部仓位
    assert_eq!(tp.quantity, 1.0);
    assert_eq!(tp.stop_price, Some(52000.0));
    assert!(tp.reduce_only);

    assert_eq!(audit_events(&store, "guard_stop_loss_placed").await.len(), 1);
    let tp_audits = audit_events(&store, "guard_take_profit_placed").await;
    assert_eq!(tp_audits.len(), 1);
    assert_eq!(tp_audits[0]["tp_level"], 1);
}

/// 守护幂等：补挂完成后再跑一遍不会重复下单
#[tokio::test(start_paused = true)]
async fn test_guard_idempotent() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 2.0));
    let (engine, store) = build_engine(exchange.clone());

    let protection = serde_json::json!({
        "stop_loss": 48000.0,
        "take_profit_1": 52000.0,
        "take_profit_2": 55000.0,
        "tp1_ratio": 0.5,
        "signal_id": "sig-2",
        "timestamp": 0,
    });
    store.set("protection:BTCUSDT:LONG", &protection.to_string(), None).await.unwrap();

    engine.ensure_sltp_guard_once("10s").await;
    // SL + TP1 + TP2
    assert_eq!(exchange.placed_requests().len(), 3);

    engine.ensure_sltp_guard_once("10s").await;
    assert_eq!(exchange.placed_requests().len(), 3, "second pass must not place again");
}

/// 两级止盈的数量拆分：amt1 + amt2 == size
#[tokio::test(start_paused = true)]
async fn test_guard_two_tier_quantities() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 2.0));
    let (engine, store) = build_engine(exchange.clone());

    let protection = serde_json::json!({
        "stop_loss": 48000.0,
        "take_profit_1": 52000.0,
        "take_profit_2": 55000.0,
        "tp1_ratio": 0.5,
        "signal_id": "sig-3",
        "timestamp": 0,
    });
    store.set("protection:BTCUSDT:LONG", &protection.to_string(), None).await.unwrap();

    engine.ensure_sltp_guard_once("10s").await;

    let placed = exchange.placed_requests();
    let tps: Vec<_> =
        placed.iter().filter(|r| r.order_type == OrderType::TakeProfitMarket).collect();
    assert_eq!(tps.len(), 2);
    let total: f64 = tps.iter().map(|r| r.quantity).sum();
    assert!((total - 2.0).abs() < 1e-8);
    assert!(tps.iter().any(|r| r.stop_price == Some(52000.0) && (r.quantity - 1.0).abs() < 1e-8));
    assert!(tps.iter().any(|r| r.stop_price == Some(55000.0) && (r.quantity - 1.0).abs() < 1e-8));
}

/// 非法保护参数：只审计，不下单
#[tokio::test(start_paused = true)]
async fn test_guard_invalid_protection_params() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 1.0));
    let (engine, store) = build_engine(exchange.clone());

    let protection = serde_json::json!({
        "stop_loss": 0.0,
        "take_profit_1": 52000.0,
        "take_profit_2": 0.0,
        "tp1_ratio": 0.5,
        "signal_id": "sig-4",
        "timestamp": 0,
    });
    store.set("protection:BTCUSDT:LONG", &protection.to_string(), None).await.unwrap();

    engine.ensure_sltp_guard_once("10s").await;

    assert!(exchange.placed_requests().is_empty());
    assert_eq!(audit_events(&store, "guard_invalid_protection_params").await.len(), 1);
}

/// S4: 仓位已平后清理孤儿保护信息与残留 reduce-only 挂单
#[tokio::test(start_paused = true)]
async fn test_guard_orphan_cleanup() {
    let exchange = Arc::new(MockExchange::default());
    let (engine, store) = build_engine(exchange.clone());

    store
        .set(
            "protection:ETHUSDT:LONG",
            &serde_json::json!({
                "stop_loss": 2800.0,
                "take_profit_1": 3400.0,
                "take_profit_2": 0.0,
                "tp1_ratio": 0.5,
                "signal_id": "sig-5",
                "timestamp": 0,
            })
            .to_string(),
            None,
        )
        .await
        .unwrap();

    let residual = |id: &str, order_type: OrderType, stop: f64| Order {
        id: id.to_string(),
        symbol: "ETHUSDT".to_string(),
        side: OrderSide::Sell,
        position_side: PositionSide::Long,
        order_type,
        quantity: 1.0,
        price: 0.0,
        stop_price: stop,
        status: OrderStatus::New,
        filled_qty: 0.0,
        avg_price: 0.0,
        reduce_only: true,
        timestamp: 0,
    };
    exchange.add_open_order(residual("sl-1", OrderType::StopMarket, 2800.0));
    exchange.add_open_order(residual("tp-1", OrderType::TakeProfitMarket, 3400.0));

    engine.ensure_sltp_guard_once("10s").await;

    let cancelled = exchange.cancelled_ids();
    assert_eq!(cancelled.len(), 2, "cancelled={:?}", cancelled);
    assert!(cancelled.iter().any(|(_, id)| id == "sl-1"));
    assert!(cancelled.iter().any(|(_, id)| id == "tp-1"));

    assert!(store.get("protection:ETHUSDT:LONG").await.unwrap().is_none());

    let audits = audit_events(&store, "auto_cancel_reduceonly_after_flat").await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0]["count"], 2);
    assert_eq!(audits[0]["position_side"], "LONG");
}

/// 平仓路径：方向不匹配与无持仓时拒绝
#[tokio::test(start_paused = true)]
async fn test_close_position_preconditions() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 1.0));
    let (engine, _) = build_engine(exchange.clone());

    // close_short 但持仓是 LONG
    let mut signal = Signal::new("BTCUSDT", Action::CloseShort, TradeSide::Short);
    signal.assign_id();
    let result = engine.close_position_from_action(&signal).await;
    assert!(!result.ok);
    assert!(result.reason.contains("position side mismatch"), "reason={}", result.reason);

    // 无持仓的币种
    let mut signal = Signal::new("SOLUSDT", Action::CloseLong, TradeSide::Long);
    signal.assign_id();
    let result = engine.close_position_from_action(&signal).await;
    assert!(!result.ok);
    assert_eq!(result.reason, "no open position");
}

/// 平仓成功路径：市价 reduce-only 全仓平掉
#[tokio::test(start_paused = true)]
async fn test_close_position_success() {
    let exchange = Arc::new(MockExchange::with_position("BTCUSDT", PositionSide::Long, 1.5));
    let (engine, store) = build_engine(exchange.clone());

    let mut signal = Signal::new("BTCUSDT", Action::CloseLong, TradeSide::Long);
    signal.assign_id();
    let result = engine.close_position_from_action(&signal).await;
    assert!(result.ok, "reason={}", result.reason);

    let placed = exchange.placed_requests();
    assert_eq!(placed.len(), 1);
    assert_eq!(placed[0].order_type, OrderType::Market);
    assert_eq!(placed[0].side, OrderSide::Sell);
    assert_eq!(placed[0].quantity, 1.5);
    assert!(placed[0].reduce_only);

    let history = store.lrange("trade_history", 0, -1).await.unwrap();
    assert!(history.iter().any(|row| row.contains("position_closed")));
}
