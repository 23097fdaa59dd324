//! 执行循环：阻塞消费 trade_queue，按动作分派到执行引擎

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use nofx_execution::{bus::QUEUE_POP_TIMEOUT, ExecutionEngine, SignalBus};

pub async fn run_execution_loop(
    engine: ExecutionEngine,
    bus: SignalBus,
    shutting_down: Arc<AtomicBool>,
    mut shutdown: broadcast::Receiver<()>,
) {
    info!("🚀 交易执行循环启动");

    loop {
        if shutting_down.load(Ordering::Acquire) {
            break;
        }

        let popped = tokio::select! {
            result = bus.pop_signal(QUEUE_POP_TIMEOUT) => result,
            _ = shutdown.recv() => break,
        };

        let signal = match popped {
            Ok(Some(signal)) => signal,
            // 超时或坏消息：继续等下一条
            Ok(None) => continue,
            Err(e) => {
                warn!("读取交易队列失败: {}", e);
                continue;
            }
        };

        info!(
            "收到交易指令: symbol={}, action={}, signal_id={}",
            signal.symbol,
            signal.action.as_str(),
            signal.signal_id
        );

        let result = if signal.action.is_close() {
            engine.close_position_from_action(&signal).await
        } else if signal.action.is_open() {
            if signal.entry_price > 0.0 {
                engine.place_order_from_signal(&signal).await
            } else {
                warn!("开仓信号缺少入场价，跳过: symbol={}", signal.symbol);
                continue;
            }
        } else {
            info!("跳过执行: symbol={}, action={}", signal.symbol, signal.action.as_str());
            continue;
        };

        if result.ok {
            info!(
                "执行成功: symbol={}, action={}, order_id={}, reason={}",
                signal.symbol,
                signal.action.as_str(),
                result.order.as_ref().map(|o| o.id.as_str()).unwrap_or(""),
                result.reason
            );
        } else {
            warn!(
                "执行失败: symbol={}, action={}, reason={}",
                signal.symbol,
                signal.action.as_str(),
                result.reason
            );
        }
    }

    info!("交易执行循环停止");
}
