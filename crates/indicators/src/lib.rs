//! # NOFX Indicators
//!
//! 指标内核：对 `&[f64]` / `&[Ohlcv]` 的纯函数计算

pub mod momentum;
pub mod pattern;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use momentum::rsi::calculate_rsi;
pub use pattern::candle::detect_candle_pattern;
pub use trend::ema::calculate_ema;
pub use volatility::bollinger::{calculate_bollinger_bands, is_bollinger_squeeze};
pub use volume::{calculate_cvd, calculate_obv};
