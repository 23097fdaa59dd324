//! # NOFX Strategies
//!
//! 规则策略实现（AI 不可用或 rule 模式时的决策来源）

pub mod rule;

pub use rule::RsiReversalStrategy;
