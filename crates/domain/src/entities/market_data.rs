//! 市场快照相关实体

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::CandlePattern;

/// K线数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Ohlcv {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub time: i64,
}

/// 布林带
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
    pub squeeze: bool,
}

/// 账户信息（附加给 AI 决策用）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub positions: Vec<Value>,
}

/// 单币种市场快照：扫描器每轮生成，决策路由消费后即丢弃
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub current_price: f64,
    pub price_change_pct_24h: f64,
    pub open_interest: f64,
    pub open_interest_change: f64,
    pub funding_rate: f64,
    /// 最新一根1m K线的成交量
    pub volume: f64,
    pub volume_24h: f64,
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_1m: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_3m: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_5m: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_15m: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_30m: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_1h: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_4h: Vec<Ohlcv>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ohlcv_1d: Vec<Ohlcv>,

    // 技术指标：EMA20/50 来自3m收盘价，EMA200/RSI/BB/CVD/OBV 来自1h
    #[serde(default)]
    pub ema_20: f64,
    #[serde(default)]
    pub ema_50: f64,
    #[serde(default)]
    pub ema_200: f64,
    #[serde(default)]
    pub rsi: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bb: Option<BollingerBands>,
    #[serde(default)]
    pub cvd: f64,
    #[serde(default)]
    pub obv: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candle_pattern: Option<CandlePattern>,

    // 预过滤特征
    #[serde(default)]
    pub volume_peak_ratio: f64,
    #[serde(default)]
    pub consecutive_count: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountInfo>,
}

/// 24小时 Ticker 摘要
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ticker24h {
    pub last_price: f64,
    pub price_change_percent: f64,
    #[serde(default)]
    pub quote_volume: f64,
}

/// 合约元信息（取自交易所 exchangeInfo）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketInfo {
    pub symbol: String,
    /// 上市时间（毫秒时间戳），未知时为 None（保守保留）
    #[serde(default)]
    pub onboard_date: Option<i64>,
    #[serde(default)]
    pub tick_size: Option<f64>,
    #[serde(default)]
    pub price_precision: Option<u32>,
}
