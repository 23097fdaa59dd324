//! 蜡烛图形态识别：只看最近两根K线

use nofx_domain::{CandlePattern, Ohlcv};

/// 按实体/影线比例分类最近两根K线形态。
/// 不足两根返回 `Unknown`
pub fn detect_candle_pattern(ohlcv: &[Ohlcv]) -> CandlePattern {
    if ohlcv.len() < 2 {
        return CandlePattern::Unknown;
    }

    let current = &ohlcv[ohlcv.len() - 1];
    let prev = &ohlcv[ohlcv.len() - 2];

    let body = (current.close - current.open).abs();
    let upper_shadow = current.high - current.open.max(current.close);
    let lower_shadow = current.open.min(current.close) - current.low;

    let is_bullish = current.close > current.open;
    let is_prev_bullish = prev.close > prev.open;

    // 锤子/上吊：下影线 > 2×实体 且上影线 < 0.1×实体
    if lower_shadow > body * 2.0 && upper_shadow < body * 0.1 {
        return if is_bullish { CandlePattern::Hammer } else { CandlePattern::HangingMan };
    }

    // 吞没形态
    if is_bullish && !is_prev_bullish && current.close > prev.open && current.open < prev.close {
        return CandlePattern::BullishEngulfing;
    }
    if !is_bullish && is_prev_bullish && current.close < prev.open && current.open > prev.close {
        return CandlePattern::BearishEngulfing;
    }

    // 十字星：实体 < 0.1×全幅
    if body < (current.high - current.low) * 0.1 {
        return CandlePattern::Doji;
    }

    CandlePattern::Normal
}
