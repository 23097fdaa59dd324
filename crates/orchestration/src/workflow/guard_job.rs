//! SL/TP 守护循环：每 `sltp_guard_interval_sec` 对账一次

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::info;

use nofx_execution::ExecutionEngine;

pub async fn run_guard_loop(
    engine: ExecutionEngine,
    interval_sec: f64,
    shutting_down: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = Duration::from_secs_f64(interval_sec.max(1.0));
    let interval_tag = format!("{:.0}s", interval.as_secs_f64());

    info!("🚀 SL/TP守护循环启动: interval={:?}", interval);

    loop {
        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => break,
        }

        engine.ensure_sltp_guard_once(&interval_tag).await;
    }

    info!("SL/TP守护循环停止");
}
