//! 签名端点：下单、撤单、订单/持仓查询
//!
//! DRY_RUN 模式下所有写操作只记日志并返回合成结果

use anyhow::{anyhow, Result};
use chrono::Utc;
use reqwest::Method;
use serde_json::Value;
use tracing::info;

use nofx_domain::{Order, OrderRequest, OrderSide, OrderStatus, OrderType, Position, PositionSide};

use super::{value_f64, value_str, BinanceExchange};

impl BinanceExchange {
    pub(crate) async fn submit_order(&self, req: &OrderRequest) -> Result<Order> {
        let symbol = Self::normalize_symbol(&req.symbol);

        if self.settings.dry_run {
            info!(
                "DRY_RUN: Order would be placed: symbol={}, side={}, type={}, qty={}, price={:?}",
                symbol,
                req.side.as_str(),
                req.order_type.as_str(),
                req.quantity,
                req.price,
            );
            return Ok(Order {
                id: format!("dry_run_{}", Utc::now().timestamp_nanos_opt().unwrap_or_default()),
                symbol,
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
                timestamp: Utc::now().timestamp(),
            });
        }

        let mut params: Vec<(&str, String)> = vec![
            ("symbol", symbol.clone()),
            ("side", req.side.as_str().to_string()),
            ("type", req.order_type.as_str().to_string()),
            ("quantity", format_qty(req.quantity)),
            ("positionSide", req.position_side.as_str().to_string()),
        ];

        if let Some(price) = req.price.filter(|p| *p > 0.0) {
            params.push(("price", format_qty(price)));
        }
        if let Some(stop_price) = req.stop_price.filter(|p| *p > 0.0) {
            params.push(("stopPrice", format_qty(stop_price)));
        }
        match &req.time_in_force {
            Some(tif) => params.push(("timeInForce", tif.to_uppercase())),
            None if req.order_type == OrderType::Limit => {
                params.push(("timeInForce", "GTC".to_string()))
            }
            None => {}
        }
        if req.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        let resp = self
            .http
            .signed_request(Method::POST, "/fapi/v1/order", &params)
            .await
            .map_err(|e| anyhow!("place order failed: {}", e))?;

        Ok(Order {
            id: value_str(resp.get("orderId").unwrap_or(&Value::Null)),
            symbol,
            side: req.side,
            position_side: req.position_side,
            order_type: req.order_type,
            quantity: req.quantity,
            price: req.price.unwrap_or(0.0),
            stop_price: req.stop_price.unwrap_or(0.0),
            status: OrderStatus::parse(&value_str(resp.get("status").unwrap_or(&Value::Null))),
            filled_qty: resp.get("executedQty").map(value_f64).unwrap_or(0.0),
            avg_price: resp.get("avgPrice").map(value_f64).unwrap_or(0.0),
            reduce_only: req.reduce_only,
            timestamp: Utc::now().timestamp(),
        })
    }

    pub(crate) async fn submit_cancel(&self, symbol: &str, order_id: &str) -> Result<()> {
        let symbol = Self::normalize_symbol(symbol);

        if self.settings.dry_run {
            info!("DRY_RUN: Order would be cancelled: symbol={}, order_id={}", symbol, order_id);
            return Ok(());
        }

        self.http
            .signed_request(
                Method::DELETE,
                "/fapi/v1/order",
                &[("symbol", symbol), ("orderId", order_id.to_string())],
            )
            .await
            .map_err(|e| anyhow!("cancel order failed: {}", e))?;
        Ok(())
    }

    pub(crate) async fn fetch_order(&self, symbol: &str, order_id: &str) -> Result<Order> {
        let symbol = Self::normalize_symbol(symbol);

        if self.settings.dry_run {
            // 合成已成交订单，让确认轮询立即通过
            return Ok(Order {
                id: order_id.to_string(),
                symbol,
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
                timestamp: Utc::now().timestamp(),
            });
        }

        let resp = self
            .http
            .signed_request(
                Method::GET,
                "/fapi/v1/order",
                &[("symbol", symbol.clone()), ("orderId", order_id.to_string())],
            )
            .await
            .map_err(|e| anyhow!("get order failed: {}", e))?;

        parse_order(&symbol, &resp).ok_or_else(|| anyhow!("invalid order response"))
    }

    pub(crate) async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        let symbol = Self::normalize_symbol(symbol);

        if self.settings.dry_run {
            return Ok(Vec::new());
        }

        let resp = self
            .http
            .signed_request(Method::GET, "/fapi/v1/openOrders", &[("symbol", symbol.clone())])
            .await
            .map_err(|e| anyhow!("get open orders failed: {}", e))?;

        let orders = resp.as_array().ok_or_else(|| anyhow!("invalid open orders response"))?;
        Ok(orders.iter().filter_map(|o| parse_order(&symbol, o)).collect())
    }

    pub(crate) async fn fetch_positions(&self) -> Result<Vec<Position>> {
        if self.settings.dry_run {
            return Ok(Vec::new());
        }

        let resp = self
            .http
            .signed_request(Method::GET, "/fapi/v2/positionRisk", &[])
            .await
            .map_err(|e| anyhow!("get positions failed: {}", e))?;

        let rows = resp.as_array().ok_or_else(|| anyhow!("invalid positions response"))?;

        let mut positions = Vec::new();
        for p in rows {
            let mut size = p.get("positionAmt").map(value_f64).unwrap_or(0.0);
            if size == 0.0 {
                continue;
            }

            let side = if size < 0.0 {
                size = -size;
                PositionSide::Short
            } else {
                PositionSide::Long
            };

            positions.push(Position {
                symbol: value_str(p.get("symbol").unwrap_or(&Value::Null)),
                side,
                size,
                entry_price: p.get("entryPrice").map(value_f64).unwrap_or(0.0),
                mark_price: p.get("markPrice").map(value_f64).unwrap_or(0.0),
                unrealized_pnl: p.get("unRealizedProfit").map(value_f64).unwrap_or(0.0),
                leverage: p.get("leverage").map(value_f64).unwrap_or(0.0) as u32,
            });
        }

        Ok(positions)
    }
}

/// 交易所订单 JSON -> 领域订单。reduceOnly 字段缺失时按订单类型推断
fn parse_order(symbol: &str, o: &Value) -> Option<Order> {
    let order_type = OrderType::parse(&value_str(o.get("type")?))?;
    let reduce_only = o
        .get("reduceOnly")
        .and_then(Value::as_bool)
        .unwrap_or_else(|| order_type.is_stop_loss() || order_type.is_take_profit());

    let side = match value_str(o.get("side")?).to_uppercase().as_str() {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return None,
    };

    let position_side =
        PositionSide::parse(&value_str(o.get("positionSide").unwrap_or(&Value::Null)))
            .unwrap_or(match side {
                OrderSide::Buy => PositionSide::Long,
                OrderSide::Sell => PositionSide::Short,
            });

    Some(Order {
        id: value_str(o.get("orderId")?),
        symbol: symbol.to_string(),
        side,
        position_side,
        order_type,
        quantity: o.get("origQty").map(value_f64).unwrap_or(0.0),
        price: o.get("price").map(value_f64).unwrap_or(0.0),
        stop_price: o.get("stopPrice").map(value_f64).unwrap_or(0.0),
        status: OrderStatus::parse(&value_str(o.get("status").unwrap_or(&Value::Null))),
        filled_qty: o.get("executedQty").map(value_f64).unwrap_or(0.0),
        avg_price: o.get("avgPrice").map(value_f64).unwrap_or(0.0),
        reduce_only,
        timestamp: o.get("time").map(value_f64).unwrap_or(0.0) as i64 / 1000,
    })
}

fn format_qty(v: f64) -> String {
    // 去掉浮点格式化的尾随零
    let s = format!("{:.8}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_qty() {
        assert_eq!(format_qty(0.5), "0.5");
        assert_eq!(format_qty(10.0), "10");
        assert_eq!(format_qty(0.00012345), "0.00012345");
    }

    #[test]
    fn test_parse_order() {
        let raw = json!({
            "orderId": 123456,
            "side": "SELL",
            "positionSide": "LONG",
            "type": "STOP_MARKET",
            "status": "NEW",
            "origQty": "1.0",
            "price": "0",
            "stopPrice": "48000",
            "executedQty": "0",
            "avgPrice": "0",
            "time": 1700000000000_i64,
        });
        let order = parse_order("BTCUSDT", &raw).unwrap();
        assert_eq!(order.id, "123456");
        assert_eq!(order.order_type, OrderType::StopMarket);
        assert_eq!(order.position_side, PositionSide::Long);
        assert!(order.reduce_only);
        assert_eq!(order.effective_price(), 48000.0);
        assert_eq!(order.timestamp, 1700000000);
    }
}
