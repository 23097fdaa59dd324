//! 订单去重
//!
//! 键内嵌滚动时间窗 `floor(now/window)`：同一窗口内的相同信号
//! 折叠为一次，跨窗口的相同信号各自放行

use std::time::Duration;

use nofx_domain::Signal;

use crate::engine::ExecutionEngine;

/// 组装去重键：symbol + action + side + 入场价(固定8位小数) + 窗口序号
pub(crate) fn dedupe_key(signal: &Signal, window_sec: i64, now_unix: i64) -> String {
    format!(
        "dedupe:{}:{}:{}:{:.8}:{}",
        signal.symbol,
        signal.action.as_str(),
        signal.side.as_str(),
        signal.entry_price,
        now_unix / window_sec.max(1)
    )
}

impl ExecutionEngine {
    /// 去重检查并落标记，返回是否放行。
    /// 存储故障时放行，避免把执行链路卡死
    pub(crate) async fn check_and_set_dedupe(&self, signal: &Signal, window_sec: i64) -> bool {
        let window_sec = if window_sec > 0 { window_sec } else { 5 };
        let key = dedupe_key(signal, window_sec, chrono::Utc::now().timestamp());

        match self.ctx.store.exists(&key).await {
            Ok(true) => false,
            Ok(false) => {
                let ttl = Duration::from_secs(window_sec as u64);
                let _ = self.ctx.store.set(&key, "1", Some(ttl)).await;
                true
            }
            Err(_) => true,
        }
    }
}
