//! 持仓保护信息：守护进程据此补挂止损/止盈

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Protection {
    pub stop_loss: f64,
    pub take_profit_1: f64,
    /// 0 表示不设二级止盈
    #[serde(default)]
    pub take_profit_2: f64,
    /// TP1 平仓比例，使用前钳制到 [0,1]
    pub tp1_ratio: f64,
    #[serde(default)]
    pub signal_id: String,
    pub timestamp: i64,
}

impl Protection {
    /// 分批止盈数量拆分：amt1 + amt2 == size（1e-8 舍入精度内）。
    /// amt1 取整后为 0 时 TP1 覆盖全仓、TP2 跳过。
    pub fn split_quantities(&self, size: f64) -> (f64, f64) {
        let ratio = self.tp1_ratio.clamp(0.0, 1.0);
        let mut amt1 = round8(size * ratio);
        let mut amt2 = round8((size - amt1).max(0.0));
        if amt1 <= 0.0 {
            amt1 = size;
            amt2 = 0.0;
        }
        (amt1, amt2)
    }
}

fn round8(v: f64) -> f64 {
    (v * 1e8).round() / 1e8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protection(ratio: f64) -> Protection {
        Protection {
            stop_loss: 48000.0,
            take_profit_1: 52000.0,
            take_profit_2: 0.0,
            tp1_ratio: ratio,
            signal_id: String::new(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_split_half() {
        let (a1, a2) = protection(0.5).split_quantities(1.0);
        assert_eq!(a1, 0.5);
        assert_eq!(a2, 0.5);
        assert!((a1 + a2 - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_split_zero_ratio_takes_full_size() {
        let (a1, a2) = protection(0.0).split_quantities(2.5);
        assert_eq!(a1, 2.5);
        assert_eq!(a2, 0.0);
    }

    #[test]
    fn test_split_ratio_clamped() {
        let (a1, a2) = protection(1.7).split_quantities(3.0);
        assert_eq!(a1, 3.0);
        assert_eq!(a2, 0.0);

        let (a1, a2) = protection(-0.2).split_quantities(3.0);
        assert_eq!(a1, 3.0);
        assert_eq!(a2, 0.0);
    }

    #[test]
    fn test_split_rounding() {
        let (a1, a2) = protection(0.3333).split_quantities(0.0003);
        assert!((a1 + a2 - 0.0003).abs() < 1e-8);
    }
}
