//! 持仓与账户余额

use serde::{Deserialize, Serialize};

use crate::enums::PositionSide;

/// 交易所持仓
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub size: f64,
    pub entry_price: f64,
    pub mark_price: f64,
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub leverage: u32,
}

/// USDT 账户余额
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Balance {
    pub total: f64,
    pub free: f64,
    pub used: f64,
}
