//! 分析周期：扫描流 -> 预过滤 -> 决策 worker 池 -> 入队
//!
//! 周期结束后依据「无动作且本轮已看完整个池子」决定下一轮
//! 是否强制全量扫描

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use tokio::sync::{broadcast, Semaphore};
use tracing::{info, warn};

use nofx_core::TradeContext;
use nofx_market::Scanner;

use crate::router::DecisionRouter;

pub struct CycleOutcome {
    pub scanned_total: usize,
    pub scanned_ok: usize,
    pub any_action: bool,
}

/// 分析主循环，`shutdown` 触发后在周期边界退出
pub async fn run_analysis_loop(
    ctx: TradeContext,
    scanner: Scanner,
    router: Arc<DecisionRouter>,
    shutting_down: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("🚀 市场分析循环启动");

    let mut force_full = false;

    loop {
        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        let started = Instant::now();
        let outcome =
            run_analysis_cycle(&scanner, &router, force_full, shutting_down.clone()).await;

        match &outcome {
            Ok(outcome) => {
                save_scan_result(&ctx, outcome, started.elapsed()).await;
                force_full = next_force_full(&ctx.settings, outcome);
            }
            Err(e) => {
                warn!("扫描市场失败: {}", e);
                force_full = false;
            }
        }

        let interval = Duration::from_secs(ctx.settings.analysis_interval_sec() as u64);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.recv() => break,
        }
    }

    info!("市场分析循环停止");
}

/// 跑一个完整分析周期
pub async fn run_analysis_cycle(
    scanner: &Scanner,
    router: &Arc<DecisionRouter>,
    force_full: bool,
    shutting_down: Arc<AtomicBool>,
) -> anyhow::Result<CycleOutcome> {
    let batch_size = scanner.settings().ai_batch_size.max(1);

    let mut rx = scanner.scan_stream(force_full, shutting_down.clone()).await?;

    let semaphore = Arc::new(Semaphore::new(batch_size));
    let any_action = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    let mut scanned_total = 0usize;
    let mut scanned_ok = 0usize;

    while let Some(md) = rx.recv().await {
        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        scanned_total += 1;
        scanned_ok += 1;

        if !router.should_analyze(&md) {
            continue;
        }

        let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
        let router = router.clone();
        let any_action = any_action.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit;
            if router.process_market_data(&md).await {
                any_action.store(true, Ordering::Release);
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            warn!("决策任务异常: {}", e);
        }
    }

    Ok(CycleOutcome {
        scanned_total,
        scanned_ok,
        any_action: any_action.load(Ordering::Acquire),
    })
}

/// 下一轮强制全量的条件：配置开启、本轮无动作、且本轮已把池子看完
/// （scanned_ok 不超过一个批次视为看完）
fn next_force_full(settings: &nofx_core::Settings, outcome: &CycleOutcome) -> bool {
    let analyzed_all =
        outcome.scanned_ok == 0 || outcome.scanned_ok <= settings.ai_batch_size;
    settings.ai_force_full_pool_when_no_action && !outcome.any_action && analyzed_all
}

async fn save_scan_result(ctx: &TradeContext, outcome: &CycleOutcome, cost: Duration) {
    let payload = json!({
        "ts": Utc::now().timestamp(),
        "cost_sec": cost.as_secs_f64(),
        "total": outcome.scanned_total,
        "ok": outcome.scanned_ok,
    });

    let ttl_sec = (ctx.settings.scan_interval_sec * 3).max(60);
    let _ = ctx
        .store
        .set(
            "scanner_last_scan",
            &payload.to_string(),
            Some(Duration::from_secs(ttl_sec as u64)),
        )
        .await;
}
