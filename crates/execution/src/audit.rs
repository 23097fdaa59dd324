//! 审计与交易历史：LPUSH + LTRIM 的有界列表

use nofx_domain::AuditEvent;
use tracing::warn;

use crate::engine::ExecutionEngine;

const AUDIT_KEY: &str = "order_audit";
const TRADE_HISTORY_KEY: &str = "trade_history";
const TRUNCATED_SUFFIX: &str = "...[truncated]";

impl ExecutionEngine {
    /// 追加审计事件，超长事件按字符边界截断
    pub(crate) async fn save_audit(&self, event: AuditEvent) {
        let settings = &self.ctx.settings;
        let max_chars = if settings.order_audit_event_max_chars > 0 {
            settings.order_audit_event_max_chars
        } else {
            2000
        };

        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!("序列化审计事件失败: {}", e);
                return;
            }
        };

        let payload = truncate_chars(&json, max_chars);

        if let Err(e) = self.ctx.store.lpush(AUDIT_KEY, &payload).await {
            warn!("写入审计日志失败: {}", e);
            return;
        }
        let max_len = settings.order_audit_max_len.max(1);
        let _ = self.ctx.store.ltrim(AUDIT_KEY, 0, (max_len - 1) as isize).await;
    }

    /// 追加交易历史
    pub(crate) async fn push_trade_history(&self, event: AuditEvent) {
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                warn!("序列化交易历史失败: {}", e);
                return;
            }
        };

        if let Err(e) = self.ctx.store.lpush(TRADE_HISTORY_KEY, &json).await {
            warn!("写入交易历史失败: {}", e);
            return;
        }
        let max_len = self.ctx.settings.trade_history_max_len.max(1);
        let _ = self.ctx.store.ltrim(TRADE_HISTORY_KEY, 0, (max_len - 1) as isize).await;
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &s[..end], TRUNCATED_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");

        let long = "x".repeat(100);
        let out = truncate_chars(&long, 10);
        assert!(out.starts_with("xxxxxxxxxx"));
        assert!(out.ends_with(TRUNCATED_SUFFIX));

        // 多字节字符不被拦腰截断
        let cn = "你好世界你好世界";
        let out = truncate_chars(cn, 7);
        assert!(out.ends_with(TRUNCATED_SUFFIX));
        assert!(out.starts_with("你好"));
    }
}
