//! 单币种扫描：多周期K线 + 行情衍生数据并发抓取，计算指标后落快照

use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tracing::{debug, warn};

use nofx_core::TradeContext;
use nofx_indicators::{
    calculate_bollinger_bands, calculate_cvd, calculate_ema, calculate_obv, calculate_rsi,
    detect_candle_pattern, is_bollinger_squeeze,
};
use nofx_domain::{BollingerBands, MarketData, Ohlcv};

#[derive(Clone)]
pub struct Scanner {
    pub(crate) ctx: TradeContext,
}

impl Scanner {
    pub fn new(ctx: TradeContext) -> Self {
        Self { ctx }
    }

    pub fn settings(&self) -> std::sync::Arc<nofx_core::Settings> {
        self.ctx.settings.clone()
    }

    /// 扫描单个交易对
    pub async fn scan_symbol(&self, symbol: &str) -> Result<MarketData> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(anyhow!("invalid symbol"));
        }

        let exchange = &self.ctx.exchange;

        // 八个周期的K线与 ticker/资金费率/持仓量并发抓取
        let (k1m, k3m, k5m, k15m, k30m, k1h, k4h, k1d, ticker_price, ticker_24h, funding, oi) = tokio::join!(
            exchange.get_klines(&symbol, "1m", 50),
            exchange.get_klines(&symbol, "3m", 50),
            exchange.get_klines(&symbol, "5m", 50),
            exchange.get_klines(&symbol, "15m", 200),
            exchange.get_klines(&symbol, "30m", 100),
            exchange.get_klines(&symbol, "1h", 200),
            exchange.get_klines(&symbol, "4h", 200),
            exchange.get_klines(&symbol, "1d", 200),
            exchange.get_ticker_price(&symbol),
            exchange.get_ticker_24h(&symbol),
            exchange.get_funding_rate(&symbol),
            exchange.get_open_interest(&symbol),
        );

        // 核心周期缺失直接放弃该币种
        let ohlcv_1m = k1m.ok().filter(|d| !d.is_empty())
            .ok_or_else(|| anyhow!("failed to get 1m OHLCV for {}", symbol))?;
        let ohlcv_3m = k3m.ok().filter(|d| !d.is_empty())
            .ok_or_else(|| anyhow!("failed to get 3m OHLCV for {}", symbol))?;
        let ohlcv_15m = k15m.ok().filter(|d| !d.is_empty())
            .ok_or_else(|| anyhow!("failed to get 15m OHLCV for {}", symbol))?;

        let ohlcv_5m = k5m.unwrap_or_default();
        let ohlcv_30m = k30m.unwrap_or_default();
        let ohlcv_1h = k1h.unwrap_or_default();
        let ohlcv_4h = k4h.unwrap_or_default();
        let ohlcv_1d = k1d.unwrap_or_default();

        let closes_3m: Vec<f64> = ohlcv_3m.iter().map(|c| c.close).collect();
        let closes_1h: Vec<f64> = ohlcv_1h.iter().map(|c| c.close).collect();

        let settings = &self.ctx.settings;

        let ema_20 = calculate_ema(&closes_3m, settings.ind_ema_period_20);
        let ema_50 = calculate_ema(&closes_3m, settings.ind_ema_period_50);
        let ema_200 = calculate_ema(&closes_1h, settings.ind_ema_period_200);
        let rsi = calculate_rsi(&closes_1h, settings.ind_rsi_period);

        let (bb_upper, bb_middle, bb_lower) =
            calculate_bollinger_bands(&closes_1h, settings.ind_bb_period, settings.ind_bb_std_dev);
        let bb = BollingerBands {
            upper: bb_upper,
            middle: bb_middle,
            lower: bb_lower,
            squeeze: is_bollinger_squeeze(
                bb_upper,
                bb_middle,
                bb_lower,
                settings.bb_squeeze_bandwidth,
            ),
        };

        let current_price = match ticker_price {
            Ok(p) if p > 0.0 => p,
            _ => ohlcv_1m.last().map(|c| c.close).unwrap_or(0.0),
        };

        // 24h 涨跌幅：ticker 不可达时置 0 并告警（预过滤会因此失去该特征）
        let price_change_pct_24h = match &ticker_24h {
            Ok(t) => t.price_change_percent,
            Err(e) => {
                warn!("获取24h ticker失败，涨跌幅按0处理: symbol={}, error={}", symbol, e);
                0.0
            }
        };
        let volume_24h = ticker_24h.as_ref().map(|t| t.quote_volume).unwrap_or(0.0);

        let open_interest = oi.unwrap_or(0.0);
        let open_interest_change = self.calculate_oi_change(&symbol, open_interest).await;

        let volumes_1m: Vec<f64> = ohlcv_1m.iter().map(|c| c.volume).collect();

        let market_data = MarketData {
            symbol: symbol.clone(),
            current_price,
            price_change_pct_24h,
            open_interest,
            open_interest_change,
            funding_rate: funding.unwrap_or(0.0),
            volume: volumes_1m.last().copied().unwrap_or(0.0),
            volume_24h,
            timestamp: Utc::now().timestamp(),
            ema_20,
            ema_50,
            ema_200,
            rsi,
            bb: Some(bb),
            cvd: calculate_cvd(&ohlcv_1h),
            obv: calculate_obv(&ohlcv_1h),
            candle_pattern: Some(detect_candle_pattern(&ohlcv_15m)),
            volume_peak_ratio: volume_peak_ratio(&volumes_1m),
            consecutive_count: consecutive_count(&ohlcv_3m, ema_20, ema_50),
            account: None,
            ohlcv_1m,
            ohlcv_3m,
            ohlcv_5m,
            ohlcv_15m,
            ohlcv_30m,
            ohlcv_1h,
            ohlcv_4h,
            ohlcv_1d,
        };

        self.save_market_snapshot(&market_data).await;

        debug!(
            "Symbol scanned: symbol={}, price={}, ema20={:.6}, rsi={:.2}",
            symbol, current_price, ema_20, rsi
        );

        Ok(market_data)
    }

    /// 持仓量变化百分比：有上一次快照且非零才有定义，否则 0
    async fn calculate_oi_change(&self, symbol: &str, current_oi: f64) -> f64 {
        let key = format!("oi:last:{}", symbol);
        let ttl = Duration::from_secs(self.ctx.settings.oi_last_ttl_sec.max(1) as u64);

        let last_oi = match self.ctx.store.get(&key).await {
            Ok(Some(v)) => v.trim().parse::<f64>().unwrap_or(0.0),
            _ => 0.0,
        };

        if current_oi > 0.0 {
            let _ = self.ctx.store.set(&key, &format!("{}", current_oi), Some(ttl)).await;
        }

        if last_oi > 0.0 {
            ((current_oi - last_oi) / last_oi) * 100.0
        } else {
            0.0
        }
    }

    async fn save_market_snapshot(&self, data: &MarketData) {
        let key = format!("market_snapshot:{}", data.symbol);
        let ttl = Duration::from_secs(self.ctx.settings.market_snapshot_ttl_sec.max(1) as u64);
        match serde_json::to_string(data) {
            Ok(json) => {
                if let Err(e) = self.ctx.store.set(&key, &json, Some(ttl)).await {
                    warn!("保存市场快照失败: symbol={}, error={}", data.symbol, e);
                }
            }
            Err(e) => warn!("序列化市场快照失败: symbol={}, error={}", data.symbol, e),
        }
    }
}

/// 成交量峰值比：最新一根对此前 20 根内的峰值。样本不足返回 1.0
pub(crate) fn volume_peak_ratio(volumes: &[f64]) -> f64 {
    if volumes.len() < 20 {
        return 1.0;
    }
    let current = volumes[volumes.len() - 1];
    let peak = volumes[volumes.len() - 20..volumes.len() - 1]
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(*v));
    if peak > 0.0 {
        current / peak
    } else {
        1.0
    }
}

/// 最近 6 根内收盘价持续站在 EMA20 趋势侧的连续根数，
/// 趋势方向由 EMA20 与 EMA50 的相对位置决定
pub(crate) fn consecutive_count(ohlcv: &[Ohlcv], ema_20: f64, ema_50: f64) -> i64 {
    if ohlcv.len() < 6 || ema_20 == 0.0 {
        return 0;
    }

    let long_bias = ema_20 >= ema_50;
    let mut count = 0;
    for candle in &ohlcv[ohlcv.len() - 6..ohlcv.len() - 1] {
        let on_trend_side =
            if long_bias { candle.close > ema_20 } else { candle.close < ema_20 };
        if on_trend_side {
            count += 1;
        } else {
            count = 0;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(close: f64, volume: f64) -> Ohlcv {
        Ohlcv { open: close, high: close, low: close, close, volume, time: 0 }
    }

    #[test]
    fn test_volume_peak_ratio() {
        assert_eq!(volume_peak_ratio(&[1.0; 10]), 1.0);

        let mut volumes = vec![10.0; 25];
        volumes.push(20.0);
        assert_eq!(volume_peak_ratio(&volumes), 2.0);

        let mut volumes = vec![0.0; 25];
        volumes.push(5.0);
        assert_eq!(volume_peak_ratio(&volumes), 1.0);
    }

    #[test]
    fn test_consecutive_count_long_bias() {
        // EMA20 > EMA50：统计收盘价在 EMA20 上方的连续根数
        let bars: Vec<Ohlcv> = (0..10).map(|_| bar(101.0, 1.0)).collect();
        assert_eq!(consecutive_count(&bars, 100.0, 90.0), 5);

        // 中途跌破则重新计数
        let mut bars: Vec<Ohlcv> = (0..10).map(|_| bar(101.0, 1.0)).collect();
        let idx = bars.len() - 3;
        bars[idx] = bar(99.0, 1.0);
        assert_eq!(consecutive_count(&bars, 100.0, 90.0), 1);
    }

    #[test]
    fn test_consecutive_count_short_bias_and_edge() {
        let bars: Vec<Ohlcv> = (0..10).map(|_| bar(99.0, 1.0)).collect();
        assert_eq!(consecutive_count(&bars, 100.0, 110.0), 5);

        assert_eq!(consecutive_count(&bars[..5], 100.0, 110.0), 0);
        assert_eq!(consecutive_count(&bars, 0.0, 110.0), 0);
    }
}
