//! RSI 反转规则策略

use serde_json::json;

use nofx_domain::{Action, Decision, MarketData, Signal, Strategy, TradeSide};

/// 默认规则策略：RSI 超卖做多、超买做空，固定 2% 止损 / 5% 止盈。
/// 纯函数，同一快照重复调用结果一致
pub struct RsiReversalStrategy {
    oversold: f64,
    overbought: f64,
}

impl RsiReversalStrategy {
    pub fn new(oversold: f64, overbought: f64) -> Self {
        Self { oversold, overbought }
    }
}

impl Default for RsiReversalStrategy {
    fn default() -> Self {
        Self::new(30.0, 70.0)
    }
}

impl Strategy for RsiReversalStrategy {
    fn name(&self) -> &'static str {
        "rsi_reversal"
    }

    fn decide(&self, market_data: &MarketData) -> Decision {
        let rsi = market_data.rsi;
        let price = market_data.current_price;

        if rsi > 0.0 && price > 0.0 {
            if rsi < self.oversold {
                let mut signal =
                    Signal::new(&market_data.symbol, Action::OpenLong, TradeSide::Long);
                signal.entry_price = price;
                signal.stop_loss = price * 0.98;
                signal.take_profit = price * 1.05;
                signal.reason = "RSI超卖，做多".to_string();
                return Decision {
                    action: Action::OpenLong,
                    signal: Some(signal),
                    reason: "RSI超卖，做多".to_string(),
                    detail: json!({ "rsi": rsi }),
                };
            }
            if rsi > self.overbought {
                let mut signal =
                    Signal::new(&market_data.symbol, Action::OpenShort, TradeSide::Short);
                signal.entry_price = price;
                signal.stop_loss = price * 1.02;
                signal.take_profit = price * 0.95;
                signal.reason = "RSI超买，做空".to_string();
                return Decision {
                    action: Action::OpenShort,
                    signal: Some(signal),
                    reason: "RSI超买，做空".to_string(),
                    detail: json!({ "rsi": rsi }),
                };
            }
        }

        Decision::wait("无交易信号")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn md(symbol: &str, price: f64, rsi: f64) -> MarketData {
        MarketData {
            symbol: symbol.to_string(),
            current_price: price,
            rsi,
            ..Default::default()
        }
    }

    #[test]
    fn test_oversold_opens_long() {
        let strategy = RsiReversalStrategy::default();
        let decision = strategy.decide(&md("BTCUSDT", 50000.0, 25.0));
        assert_eq!(decision.action, Action::OpenLong);
        let signal = decision.signal.unwrap();
        assert_eq!(signal.side, TradeSide::Long);
        assert!((signal.stop_loss - 49000.0).abs() < 1e-6);
        assert!((signal.take_profit - 52500.0).abs() < 1e-6);
    }

    #[test]
    fn test_overbought_opens_short() {
        let strategy = RsiReversalStrategy::default();
        let decision = strategy.decide(&md("ETHUSDT", 2000.0, 80.0));
        assert_eq!(decision.action, Action::OpenShort);
        let signal = decision.signal.unwrap();
        assert_eq!(signal.side, TradeSide::Short);
        assert!((signal.stop_loss - 2040.0).abs() < 1e-6);
        assert!((signal.take_profit - 1900.0).abs() < 1e-6);
    }

    #[test]
    fn test_neutral_waits() {
        let strategy = RsiReversalStrategy::default();
        assert_eq!(strategy.decide(&md("BTCUSDT", 50000.0, 55.0)).action, Action::Wait);
        // RSI 缺失（0）不触发
        assert_eq!(strategy.decide(&md("BTCUSDT", 50000.0, 0.0)).action, Action::Wait);
    }

    #[test]
    fn test_pure_function() {
        let strategy = RsiReversalStrategy::default();
        let snapshot = md("BTCUSDT", 50000.0, 25.0);
        let first = strategy.decide(&snapshot);
        let second = strategy.decide(&snapshot);
        assert_eq!(first.action, second.action);
        assert_eq!(
            first.signal.as_ref().unwrap().entry_price,
            second.signal.as_ref().unwrap().entry_price
        );
    }
}
