//! 信号/队列总线
//!
//! - `signal:{symbol}`: 最新信号，带 TTL
//! - `signal_history`: 头插有界列表（新者在前）
//! - `trade_queue`: LPUSH + BRPOP，跨进程 FIFO 队列
//!
//! 所有有界列表用 LPUSH + LTRIM 控制内存

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::warn;

use nofx_core::Settings;
use nofx_domain::{Signal, Store};

const SIGNAL_HISTORY_KEY: &str = "signal_history";
const TRADE_QUEUE_KEY: &str = "trade_queue";

/// 执行循环从队列取信号的阻塞超时
pub const QUEUE_POP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct SignalBus {
    store: Arc<dyn Store>,
    settings: Arc<Settings>,
}

impl SignalBus {
    pub fn new(store: Arc<dyn Store>, settings: Arc<Settings>) -> Self {
        Self { store, settings }
    }

    /// 发布可执行信号：最新信号键 + 历史列表 + 交易队列
    pub async fn publish_signal(&self, signal: &Signal) -> Result<()> {
        let json = serde_json::to_string(signal)?;

        let signal_key = format!("signal:{}", signal.symbol);
        let ttl = Duration::from_secs(self.settings.signal_ttl_sec.max(1) as u64);
        self.store.set(&signal_key, &json, Some(ttl)).await?;

        let history_max = self.settings.signal_history_max_len.max(1);
        self.store.lpush(SIGNAL_HISTORY_KEY, &json).await?;
        self.store.ltrim(SIGNAL_HISTORY_KEY, 0, (history_max - 1) as isize).await?;

        let queue_max = self.settings.max_trade_queue_size.max(1);
        self.store.lpush(TRADE_QUEUE_KEY, &json).await?;
        self.store.ltrim(TRADE_QUEUE_KEY, 0, (queue_max - 1) as isize).await?;

        Ok(())
    }

    /// 阻塞取下一条信号，超时返回 None；坏 JSON 丢弃并告警
    pub async fn pop_signal(&self, timeout: Duration) -> Result<Option<Signal>> {
        let Some(json) = self.store.brpop(TRADE_QUEUE_KEY, timeout).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Signal>(&json) {
            Ok(signal) => Ok(Some(signal)),
            Err(e) => {
                warn!("解析队列信号失败: error={}, payload={}", e, json);
                Ok(None)
            }
        }
    }

    /// 最近 n 条信号历史（新者在前）
    pub async fn recent_signals(&self, n: usize) -> Result<Vec<Signal>> {
        let rows = self.store.lrange(SIGNAL_HISTORY_KEY, 0, n.saturating_sub(1) as isize).await?;
        Ok(rows.iter().filter_map(|row| serde_json::from_str(row).ok()).collect())
    }
}
