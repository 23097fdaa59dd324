//! 执行引擎：信号 -> 订单
//!
//! 同一币种任意时刻至多一个在途下单（分布式锁保证，
//! 本地互斥量在集群部署下不够用）

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use nofx_core::TradeContext;
use nofx_domain::{
    Action, AuditEvent, Order, OrderRequest, OrderSide, OrderType, PositionSide, Protection,
    Signal,
};

/// 下单确认轮询间隔与上限
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_secs(2);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// 执行锁 TTL，须大于临界区内交易所 I/O 的最坏耗时
const EXECUTION_LOCK_TTL: Duration = Duration::from_secs(30);

/// 一次执行的结果三元组
#[derive(Debug)]
pub struct ExecResult {
    pub ok: bool,
    pub reason: String,
    pub order: Option<Order>,
}

impl ExecResult {
    pub(crate) fn fail(reason: impl Into<String>) -> Self {
        Self { ok: false, reason: reason.into(), order: None }
    }

    pub(crate) fn success(reason: impl Into<String>, order: Order) -> Self {
        Self { ok: true, reason: reason.into(), order: Some(order) }
    }
}

#[derive(Clone)]
pub struct ExecutionEngine {
    pub(crate) ctx: TradeContext,
    pub(crate) shutting_down: Arc<AtomicBool>,
}

impl ExecutionEngine {
    pub fn new(ctx: TradeContext, shutting_down: Arc<AtomicBool>) -> Self {
        Self { ctx, shutting_down }
    }

    /// 从交易信号下单：锁 -> 去重 -> 审计 -> 数量 -> 限价单 -> 确认 ->
    /// 保护信息 -> 交易历史
    pub async fn place_order_from_signal(&self, signal: &Signal) -> ExecResult {
        let symbol = signal.symbol.clone();
        let lock_key = format!("execution:lock:{}", symbol);

        let token = match self.acquire_lock(&lock_key, EXECUTION_LOCK_TTL).await {
            Ok(token) => token,
            Err(_) => return ExecResult::fail("lock contended"),
        };

        let result = self.place_order_locked(signal).await;
        self.release_lock(&lock_key, &token).await;
        result
    }

    async fn place_order_locked(&self, signal: &Signal) -> ExecResult {
        let symbol = &signal.symbol;
        let settings = &self.ctx.settings;

        if !self.check_and_set_dedupe(signal, settings.order_dedupe_window_sec).await {
            return ExecResult::fail("duplicate");
        }

        self.save_audit(
            AuditEvent::new("pre_order", symbol)
                .signal_id(&signal.signal_id)
                .with("action", signal.action.as_str())
                .with("side", signal.side.as_str())
                .with("entry", signal.entry_price)
                .with("stop_loss", signal.stop_loss)
                .with("take_profit", signal.take_profit),
        )
        .await;

        if signal.entry_price <= 0.0 {
            return ExecResult::fail("invalid entry price");
        }

        // 数量推导：信号带量时按其名义价值，否则按默认名义价值
        let notional = if signal.quantity > 0.0 {
            signal.quantity * signal.entry_price
        } else {
            settings.strat_default_notional_usdt
        };
        let quantity = notional / signal.entry_price;

        let request = OrderRequest {
            symbol: symbol.clone(),
            side: map_order_side(signal.action),
            position_side: signal.side.position_side(),
            order_type: OrderType::Limit,
            quantity,
            price: Some(signal.entry_price),
            stop_price: None,
            reduce_only: false,
            time_in_force: Some("GTC".to_string()),
        };

        let order = match self.ctx.exchange.place_order(&request).await {
            Ok(order) => order,
            Err(e) => {
                self.save_audit(
                    AuditEvent::new("order_failed", symbol)
                        .signal_id(&signal.signal_id)
                        .with("error", e.to_string()),
                )
                .await;
                return ExecResult::fail(format!("order failed: {}", e));
            }
        };

        let (confirmed, confirm_reason) = self.confirm_order(symbol, &order.id).await;
        if !confirmed {
            // 确认失败也返回订单，可能只是成交慢
            warn!(
                "订单确认未通过: symbol={}, order_id={}, reason={}",
                symbol, order.id, confirm_reason
            );
        }

        if signal.stop_loss > 0.0 || signal.take_profit > 0.0 {
            self.save_protection(signal).await;
        }

        self.save_audit(
            AuditEvent::new("order_placed", symbol)
                .signal_id(&signal.signal_id)
                .with("order_id", order.id.clone())
                .with("action", signal.action.as_str())
                .with("side", signal.side.as_str())
                .with("entry", signal.entry_price)
                .with("quantity", order.quantity),
        )
        .await;

        self.push_trade_history(
            AuditEvent::new("order_placed", symbol)
                .signal_id(&signal.signal_id)
                .with("order_id", order.id.clone())
                .with("action", signal.action.as_str())
                .with("side", signal.side.as_str())
                .with("entry", signal.entry_price)
                .with("quantity", order.quantity),
        )
        .await;

        info!(
            "订单执行成功: symbol={}, order_id={}, action={}",
            symbol,
            order.id,
            signal.action.as_str()
        );

        ExecResult::success("order placed", order)
    }

    /// 平仓：按动作推导方向，市价 reduce-only 平掉全部仓位
    pub async fn close_position_from_action(&self, signal: &Signal) -> ExecResult {
        let symbol = signal.symbol.clone();

        let (side, position_side) = match signal.action {
            Action::CloseLong => (OrderSide::Sell, PositionSide::Long),
            Action::CloseShort => (OrderSide::Buy, PositionSide::Short),
            other => {
                return ExecResult::fail(format!("invalid close action: {}", other.as_str()))
            }
        };

        let position = match self.ctx.exchange.get_position(&symbol).await {
            Ok(Some(p)) if p.size > 0.0 => p,
            Ok(_) => return ExecResult::fail("no open position"),
            Err(e) => return ExecResult::fail(format!("get position failed: {}", e)),
        };

        if position.side != position_side {
            return ExecResult::fail(format!(
                "position side mismatch: expected {}, actual {}",
                position_side.as_str(),
                position.side.as_str()
            ));
        }

        let lock_key = format!("execution:lock:{}", symbol);
        let token = match self.acquire_lock(&lock_key, EXECUTION_LOCK_TTL).await {
            Ok(token) => token,
            Err(_) => return ExecResult::fail("lock contended"),
        };

        let request = OrderRequest {
            symbol: symbol.clone(),
            side,
            position_side,
            order_type: OrderType::Market,
            quantity: position.size,
            price: None,
            stop_price: None,
            reduce_only: true,
            time_in_force: None,
        };

        let result = match self.ctx.exchange.place_order(&request).await {
            Ok(order) => {
                self.push_trade_history(
                    AuditEvent::new("position_closed", &symbol)
                        .signal_id(&signal.signal_id)
                        .with("order_id", order.id.clone())
                        .with("action", signal.action.as_str())
                        .with("size", position.size),
                )
                .await;
                info!(
                    "平仓成功: symbol={}, order_id={}, action={}",
                    symbol,
                    order.id,
                    signal.action.as_str()
                );
                ExecResult::success("position closed", order)
            }
            Err(e) => {
                self.save_audit(
                    AuditEvent::new("close_failed", &symbol).with("error", e.to_string()),
                )
                .await;
                ExecResult::fail(format!("close failed: {}", e))
            }
        };

        self.release_lock(&lock_key, &token).await;
        result
    }

    /// 轮询确认成交：FILLED 成功，CANCELED/REJECTED 终态失败，
    /// 超时不致命（调用方带单继续）
    async fn confirm_order(&self, symbol: &str, order_id: &str) -> (bool, String) {
        let deadline = Instant::now() + CONFIRM_TIMEOUT;

        loop {
            if self.shutting_down.load(Ordering::Acquire) {
                return (false, "cancelled".to_string());
            }
            if Instant::now() >= deadline {
                return (false, "confirm timeout".to_string());
            }

            tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;

            let order = match self.ctx.exchange.get_order(symbol, order_id).await {
                Ok(order) => order,
                Err(_) => continue,
            };

            if order.status == nofx_domain::OrderStatus::Filled {
                return (true, "filled".to_string());
            }
            if order.status.is_terminal_failure() {
                return (false, format!("order status: {:?}", order.status));
            }
        }
    }

    /// 保存保护信息，守护进程据此补挂 SL/TP
    pub async fn save_protection(&self, signal: &Signal) {
        let settings = &self.ctx.settings;
        let key = format!("protection:{}:{}", signal.symbol, signal.side.position_side().as_str());

        let protection = Protection {
            stop_loss: signal.stop_loss,
            take_profit_1: signal.take_profit,
            take_profit_2: signal.take_profit_2,
            tp1_ratio: settings.tp1_partial_ratio,
            signal_id: signal.signal_id.clone(),
            timestamp: Utc::now().timestamp(),
        };

        let ttl = Duration::from_secs(settings.protection_ttl_sec.max(1) as u64);
        match serde_json::to_string(&protection) {
            Ok(json) => {
                if let Err(e) = self.ctx.store.set(&key, &json, Some(ttl)).await {
                    warn!("保存保护信息失败: symbol={}, error={}", signal.symbol, e);
                }
            }
            Err(e) => warn!("序列化保护信息失败: {}", e),
        }
    }
}

/// 动作 -> 订单方向：open_long / close_short 买入，其余卖出
fn map_order_side(action: Action) -> OrderSide {
    match action {
        Action::OpenLong | Action::CloseShort => OrderSide::Buy,
        _ => OrderSide::Sell,
    }
}
