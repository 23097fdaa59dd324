//! 交易信号

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::enums::{Action, TradeSide};

/// 可执行的交易意图：决策路由产出，执行引擎一次性消费
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub action: Action,
    pub side: TradeSide,
    #[serde(default)]
    pub entry_price: f64,
    #[serde(default)]
    pub stop_loss: f64,
    /// 一级止盈
    #[serde(default)]
    pub take_profit: f64,
    /// 二级止盈，0 表示未设置
    #[serde(default)]
    pub take_profit_2: f64,
    /// 数量，0 表示按默认名义价值推导
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub leverage: u32,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub signal_id: String,
    pub timestamp: i64,
}

impl Signal {
    pub fn new(symbol: impl Into<String>, action: Action, side: TradeSide) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            side,
            entry_price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            take_profit_2: 0.0,
            quantity: 0.0,
            leverage: 0,
            reason: String::new(),
            signal_id: String::new(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// 生成唯一信号ID：`{symbol}_{纳秒}_{秒级时间戳}`，同一币种内随发出时间单调递增
    pub fn assign_id(&mut self) {
        let now = Utc::now();
        self.signal_id = format!(
            "{}_{}_{}",
            self.symbol,
            now.timestamp_nanos_opt().unwrap_or_default(),
            now.timestamp()
        );
    }
}
