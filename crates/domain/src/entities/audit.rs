//! 审计事件：追加到有界列表的 JSON 记录
//!
//! 事件名是对外契约的一部分（`pre_order` / `order_failed` /
//! `guard_stop_loss_placed` 等），跨版本保持稳定。

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: i64,
    pub event: String,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_id: Option<String>,
    /// 事件专属负载，保持向前兼容
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AuditEvent {
    pub fn new(event: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            ts: Utc::now().timestamp(),
            event: event.into(),
            symbol: symbol.into(),
            signal_id: None,
            extra: Map::new(),
        }
    }

    pub fn signal_id(mut self, signal_id: impl Into<String>) -> Self {
        self.signal_id = Some(signal_id.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}
