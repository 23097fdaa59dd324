//! 波动率池刷新循环
//!
//! 启动即刷一次，之后按池 TTL 的一半周期刷新，
//! 保证扫描宇宙在 TTL 过期前已被替换

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use nofx_market::Scanner;

pub async fn run_volatility_pool_loop(
    scanner: Scanner,
    shutting_down: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let ttl_sec = scanner.settings().symbol_pool_ttl_sec.max(120);
    let interval = Duration::from_secs((ttl_sec / 2) as u64);

    info!("🚀 波动率池刷新循环启动: interval={:?}", interval);

    loop {
        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        if let Err(e) = scanner.update_volatility_pool().await {
            warn!("刷新波动率池失败: {}", e);
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => break,
        }
    }

    info!("波动率池刷新循环停止");
}
