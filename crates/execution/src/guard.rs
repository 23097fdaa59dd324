//! SL/TP 守护
//!
//! 周期性对账：每个持仓必须挂有止损单和（至多两级）止盈单；
//! 持仓已平后清理残留的 reduce-only 挂单与保护信息。
//! 对账是幂等的：跑两遍与跑一遍终态一致

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use nofx_domain::{
    AuditEvent, Order, OrderRequest, OrderType, Position, PositionSide, Protection,
};

use crate::engine::ExecutionEngine;

/// 守护锁 TTL：临界区内至多约 10 秒交易所 I/O，60 秒足够
const GUARD_LOCK_TTL: Duration = Duration::from_secs(60);

/// 保护信息键扫描批大小
const PROTECTION_SCAN_COUNT: usize = 100;

impl ExecutionEngine {
    /// 单次守护：对账所有持仓的 SL/TP，然后清理孤儿保护信息。
    /// 单个持仓的失败不影响其他持仓
    pub async fn ensure_sltp_guard_once(&self, interval_tag: &str) {
        let positions = match self.ctx.exchange.get_positions().await {
            Ok(positions) => positions,
            Err(e) => {
                warn!("获取持仓失败: {}", e);
                return;
            }
        };

        // 持仓映射：symbol -> side -> size
        let mut pos_map: HashMap<String, HashMap<PositionSide, f64>> = HashMap::new();
        for pos in &positions {
            pos_map.entry(pos.symbol.clone()).or_default().insert(pos.side, pos.size);
        }

        // 持仓对账受信号量约束并发执行，每个持仓仍由
        // 分布式 (symbol, side) 锁串行化
        let semaphore = Arc::new(Semaphore::new(self.ctx.settings.guard_concurrency.max(1)));
        let mut handles = Vec::with_capacity(positions.len());

        for pos in positions {
            if pos.size <= 0.0 {
                continue;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
            let engine = self.clone();
            let tag = interval_tag.to_string();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                engine.reconcile_position(&pos, &tag).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        // 持仓为空时对账无事可做，但清理仍要跑（孤儿保护可能存在）
        self.cleanup_protection(&pos_map).await;
    }

    /// 对账单个持仓：缺哪条腿补哪条
    async fn reconcile_position(&self, pos: &Position, interval_tag: &str) {
        let symbol = &pos.symbol;
        let position_side = pos.side;
        let side_tag = position_side.as_str().to_lowercase();

        let lock_key = format!("guard:lock:{}:{}", symbol, position_side.as_str());
        let token = match self.acquire_lock(&lock_key, GUARD_LOCK_TTL).await {
            Ok(token) => token,
            // 锁竞争：跳过，下个周期重试
            Err(_) => return,
        };

        let protection_key = format!("protection:{}:{}", symbol, position_side.as_str());
        let protection: Option<Protection> = match self.ctx.store.get(&protection_key).await {
            Ok(Some(json)) => serde_json::from_str(&json).ok(),
            _ => None,
        };

        let Some(protection) = protection else {
            self.release_lock(&lock_key, &token).await;
            return;
        };

        if protection.stop_loss <= 0.0 || protection.take_profit_1 <= 0.0 {
            self.save_audit(
                AuditEvent::new("guard_invalid_protection_params", symbol)
                    .with("side", side_tag.clone())
                    .with("interval", interval_tag)
                    .with("stop_loss", protection.stop_loss)
                    .with("take_profit_1", protection.take_profit_1),
            )
            .await;
            self.release_lock(&lock_key, &token).await;
            return;
        }

        let open_orders = self.ctx.exchange.get_open_orders(symbol).await.unwrap_or_default();
        let (has_sl, has_tp1, has_tp2) = classify_protective_orders(
            &open_orders,
            position_side,
            protection.take_profit_1,
            protection.take_profit_2,
        );

        let (mut amt1, amt2) = protection.split_quantities(pos.size);
        let need_tp2 = protection.take_profit_2 > 0.0 && amt2 > 0.0;
        if !need_tp2 {
            // 不挂 TP2 时 TP1 覆盖全仓，避免留下无保护的尾仓
            amt1 = pos.size;
        }

        if !has_sl {
            match self
                .place_protective_order(
                    symbol,
                    position_side,
                    OrderType::StopMarket,
                    pos.size,
                    protection.stop_loss,
                )
                .await
            {
                Ok(order) => {
                    self.save_audit(
                        AuditEvent::new("guard_stop_loss_placed", symbol)
                            .signal_id(&protection.signal_id)
                            .with("side", side_tag.clone())
                            .with("amount", pos.size)
                            .with("stop_loss", protection.stop_loss)
                            .with("order_id", order.id)
                            .with("interval", interval_tag),
                    )
                    .await;
                }
                Err(e) => {
                    warn!("补挂止损单失败: symbol={}, error={}", symbol, e);
                    self.save_audit(
                        AuditEvent::new("guard_stop_loss_failed", symbol)
                            .signal_id(&protection.signal_id)
                            .with("side", side_tag.clone())
                            .with("interval", interval_tag)
                            .with("error", e.to_string()),
                    )
                    .await;
                }
            }
        }

        if !has_tp1 {
            self.place_take_profit_leg(
                symbol,
                position_side,
                amt1,
                protection.take_profit_1,
                1,
                &protection.signal_id,
                &side_tag,
                interval_tag,
            )
            .await;
        }

        if need_tp2 && !has_tp2 {
            self.place_take_profit_leg(
                symbol,
                position_side,
                amt2,
                protection.take_profit_2,
                2,
                &protection.signal_id,
                &side_tag,
                interval_tag,
            )
            .await;
        }

        self.release_lock(&lock_key, &token).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn place_take_profit_leg(
        &self,
        symbol: &str,
        position_side: PositionSide,
        amount: f64,
        price: f64,
        tp_level: i64,
        signal_id: &str,
        side_tag: &str,
        interval_tag: &str,
    ) {
        match self
            .place_protective_order(
                symbol,
                position_side,
                OrderType::TakeProfitMarket,
                amount,
                price,
            )
            .await
        {
            Ok(order) => {
                self.save_audit(
                    AuditEvent::new("guard_take_profit_placed", symbol)
                        .signal_id(signal_id)
                        .with("side", side_tag)
                        .with("amount", amount)
                        .with("tp_level", tp_level)
                        .with("take_profit", price)
                        .with("order_id", order.id)
                        .with("interval", interval_tag),
                )
                .await;
            }
            Err(e) => {
                warn!("补挂止盈单{}失败: symbol={}, error={}", tp_level, symbol, e);
                self.save_audit(
                    AuditEvent::new("guard_take_profit_failed", symbol)
                        .signal_id(signal_id)
                        .with("side", side_tag)
                        .with("tp_level", tp_level)
                        .with("interval", interval_tag)
                        .with("error", e.to_string()),
                )
                .await;
            }
        }
    }

    /// 挂保护单：与持仓反向的 reduce-only 触发市价单
    async fn place_protective_order(
        &self,
        symbol: &str,
        position_side: PositionSide,
        order_type: OrderType,
        quantity: f64,
        trigger_price: f64,
    ) -> anyhow::Result<Order> {
        let request = OrderRequest {
            symbol: symbol.to_string(),
            side: position_side.closing_order_side(),
            position_side,
            order_type,
            quantity,
            price: None,
            stop_price: Some(trigger_price),
            reduce_only: true,
            time_in_force: None,
        };
        self.ctx.exchange.place_order(&request).await
    }

    /// 清理已平仓位的保护信息：撤残留 reduce-only 单、删保护键
    async fn cleanup_protection(&self, pos_map: &HashMap<String, HashMap<PositionSide, f64>>) {
        let keys = match self.ctx.store.scan_match("protection:*", PROTECTION_SCAN_COUNT).await {
            Ok(keys) => keys,
            Err(e) => {
                debug!("清理保护信息失败: {}", e);
                return;
            }
        };

        let mut cancelled_total = 0usize;
        let mut deleted = 0usize;

        for key in keys {
            // 键形如 protection:{SYMBOL}:{LONG|SHORT}
            let parts: Vec<&str> = key.split(':').collect();
            if parts.len() < 3 {
                continue;
            }
            let symbol = parts[parts.len() - 2].to_uppercase();
            let Some(position_side) = PositionSide::parse(parts[parts.len() - 1]) else {
                continue;
            };

            let live_size = pos_map
                .get(&symbol)
                .and_then(|sides| sides.get(&position_side))
                .copied()
                .unwrap_or(0.0);
            if live_size > 0.0 {
                continue;
            }

            // 持仓已平：撤掉同方向残留的 reduce-only 挂单
            let mut cancelled = 0usize;
            if let Ok(orders) = self.ctx.exchange.get_open_orders(&symbol).await {
                for order in orders {
                    if !order.reduce_only || order.position_side != position_side {
                        continue;
                    }
                    if self.ctx.exchange.cancel_order(&symbol, &order.id).await.is_ok() {
                        cancelled += 1;
                    }
                }
            }

            if cancelled > 0 {
                cancelled_total += cancelled;
                self.save_audit(
                    AuditEvent::new("auto_cancel_reduceonly_after_flat", &symbol)
                        .with("position_side", position_side.as_str())
                        .with("count", cancelled),
                )
                .await;
            }

            if self.ctx.store.del(&key).await.is_ok() {
                deleted += 1;
            }
        }

        if deleted > 0 {
            debug!("清理保护信息完成: deleted={}, cancelled_orders={}", deleted, cancelled_total);
        }
    }
}

/// 识别既有保护单：reduce-only + 方向与平仓方向一致。
/// TP1/TP2 按触发价就近归属；未设置 TP2 时只认 TP1
fn classify_protective_orders(
    orders: &[Order],
    position_side: PositionSide,
    tp1: f64,
    tp2: f64,
) -> (bool, bool, bool) {
    let closing_side = position_side.closing_order_side();
    let mut has_sl = false;
    let mut has_tp1 = false;
    let mut has_tp2 = false;

    for order in orders {
        if !order.reduce_only || order.side != closing_side {
            continue;
        }
        if order.position_side != position_side {
            continue;
        }

        if order.order_type.is_stop_loss() {
            has_sl = true;
        } else if order.order_type.is_take_profit() {
            let price = order.effective_price();
            if tp2 > 0.0 {
                if (price - tp1).abs() <= (price - tp2).abs() {
                    has_tp1 = true;
                } else {
                    has_tp2 = true;
                }
            } else {
                has_tp1 = true;
            }
        }
    }

    (has_sl, has_tp1, has_tp2)
}
