//! 订单实体与下单请求

use serde::{Deserialize, Serialize};

use crate::enums::{OrderSide, OrderStatus, OrderType, PositionSide};

/// 交易所侧订单记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub quantity: f64,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stop_price: f64,
    pub status: OrderStatus,
    #[serde(default)]
    pub filled_qty: f64,
    #[serde(default)]
    pub avg_price: f64,
    #[serde(default)]
    pub reduce_only: bool,
    pub timestamp: i64,
}

impl Order {
    /// 止盈/止损订单的有效触发价：限价单看 price，市价触发单看 stop_price
    pub fn effective_price(&self) -> f64 {
        if self.price > 0.0 {
            self.price
        } else {
            self.stop_price
        }
    }
}

/// 下单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub position_side: PositionSide,
    pub order_type: OrderType,
    pub quantity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_in_force: Option<String>,
}
