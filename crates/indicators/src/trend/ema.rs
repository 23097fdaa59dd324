//! 指数移动平均

/// 计算 EMA：以前 `period` 个样本的 SMA 作为种子，乘数 2/(period+1)。
/// 样本不足时返回 0
pub fn calculate_ema(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() < period {
        return 0.0;
    }

    let mut ema: f64 = prices[..period].iter().sum::<f64>() / period as f64;

    let multiplier = 2.0 / (period as f64 + 1.0);
    for price in &prices[period..] {
        ema = (price - ema) * multiplier + ema;
    }

    ema
}
