//! 布林带

/// 计算布林带 (upper, middle, lower)：最后 `period` 个样本的
/// 均值 ± k·σ（总体标准差）。样本不足时三值同取最后一价，
/// 空序列返回 (0,0,0)
pub fn calculate_bollinger_bands(prices: &[f64], period: usize, std_dev: f64) -> (f64, f64, f64) {
    if period == 0 || prices.len() < period {
        return match prices.last() {
            Some(&last) => (last, last, last),
            None => (0.0, 0.0, 0.0),
        };
    }

    let window = &prices[prices.len() - period..];
    let sma: f64 = window.iter().sum::<f64>() / period as f64;

    let variance: f64 =
        window.iter().map(|p| (p - sma) * (p - sma)).sum::<f64>() / period as f64;
    let std = variance.sqrt();

    (sma + std_dev * std, sma, sma - std_dev * std)
}

/// 布林带挤压：带宽 (upper-lower)/middle 低于阈值。middle 为 0 时恒为 false
pub fn is_bollinger_squeeze(upper: f64, middle: f64, lower: f64, bandwidth_threshold: f64) -> bool {
    if middle == 0.0 {
        return false;
    }
    (upper - lower) / middle < bandwidth_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_short_series() {
        assert_eq!(calculate_bollinger_bands(&[], 20, 2.0), (0.0, 0.0, 0.0));
        assert_eq!(calculate_bollinger_bands(&[101.0, 102.0], 20, 2.0), (102.0, 102.0, 102.0));
    }

    #[test]
    fn test_flat_series_collapses() {
        let prices = vec![100.0; 20];
        assert_eq!(calculate_bollinger_bands(&prices, 20, 2.0), (100.0, 100.0, 100.0));
    }

    #[test]
    fn test_band_ordering() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + (i % 7) as f64).collect();
        let (upper, middle, lower) = calculate_bollinger_bands(&prices, 20, 2.0);
        assert!(upper >= middle && middle >= lower);
    }

    #[test]
    fn test_squeeze() {
        assert!(is_bollinger_squeeze(100.2, 100.0, 99.9, 0.01));
        assert!(!is_bollinger_squeeze(102.0, 100.0, 98.0, 0.01));
        assert!(!is_bollinger_squeeze(1.0, 0.0, -1.0, 0.01));
    }
}
