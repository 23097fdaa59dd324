//! 规则策略抽象

use serde_json::Value;

use crate::entities::{MarketData, Signal};
use crate::enums::Action;

/// 一次决策的完整输出
#[derive(Debug, Clone)]
pub struct Decision {
    pub action: Action,
    /// open/close 动作时携带信号
    pub signal: Option<Signal>,
    pub reason: String,
    /// 决策依据明细（入库、展示用）
    pub detail: Value,
}

impl Decision {
    pub fn wait(reason: impl Into<String>) -> Self {
        Self {
            action: Action::Wait,
            signal: None,
            reason: reason.into(),
            detail: Value::Object(Default::default()),
        }
    }
}

/// 规则策略接口。实现必须是纯函数：同一快照多次调用结果一致
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn decide(&self, market_data: &MarketData) -> Decision;
}
