//! 交易所抽象接口
//!
//! 核心只依赖这里列出的能力，与具体交易所解耦

use anyhow::Result;
use async_trait::async_trait;

use crate::entities::{Balance, MarketInfo, Ohlcv, Order, OrderRequest, Position, Ticker24h};

#[async_trait]
pub trait Exchange: Send + Sync {
    /// 获取K线数据
    async fn get_klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Ohlcv>>;

    /// 获取最新成交价
    async fn get_ticker_price(&self, symbol: &str) -> Result<f64>;

    /// 获取24小时 Ticker
    async fn get_ticker_24h(&self, symbol: &str) -> Result<Ticker24h>;

    /// 获取当前资金费率
    async fn get_funding_rate(&self, symbol: &str) -> Result<f64>;

    /// 获取持仓量
    async fn get_open_interest(&self, symbol: &str) -> Result<f64>;

    /// 获取全部 USDT 永续合约
    async fn get_usdt_perpetual_symbols(&self) -> Result<Vec<String>>;

    /// 获取合约元信息（上市时间、价格精度等）
    async fn get_market_info(&self, symbol: &str) -> Result<MarketInfo>;

    /// 下单
    async fn place_order(&self, req: &OrderRequest) -> Result<Order>;

    /// 撤单
    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()>;

    /// 查询订单
    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<Order>;

    /// 查询当前挂单
    async fn get_open_orders(&self, symbol: &str) -> Result<Vec<Order>>;

    /// 查询单币种持仓，无持仓返回 None
    async fn get_position(&self, symbol: &str) -> Result<Option<Position>>;

    /// 查询全部持仓
    async fn get_positions(&self) -> Result<Vec<Position>>;

    /// 查询账户余额
    async fn get_balance(&self) -> Result<Balance>;
}
