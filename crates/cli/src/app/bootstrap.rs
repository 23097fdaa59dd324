//! 应用启动引导
//!
//! 依赖在此构造一次（协调存储、交易所、AI、策略），
//! 随 `TradeContext` 注入各组件后交给监督器

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use nofx_ai::{create_provider, AiTrader};
use nofx_core::cache::{MemoryStore, RedisStore};
use nofx_core::{Settings, TradeContext};
use nofx_domain::{Exchange, Store, Strategy};
use nofx_exchange::BinanceExchange;
use nofx_execution::{ExecutionEngine, SignalBus};
use nofx_market::Scanner;
use nofx_orchestration::workflow::{
    run_analysis_loop, run_execution_loop, run_guard_loop, run_volatility_pool_loop,
};
use nofx_orchestration::{DecisionRouter, Supervisor};
use nofx_strategies::RsiReversalStrategy;

/// 停机限期，超过后放弃未完成任务
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

pub async fn run() -> Result<()> {
    let settings = Arc::new(Settings::from_env());

    let store = connect_store(&settings).await;
    store.ping().await?;

    let exchange: Arc<dyn Exchange> = Arc::new(BinanceExchange::new(settings.clone())?);
    let ctx = TradeContext::new(store.clone(), exchange, settings.clone());

    info!(
        "🚀 NOFX 交易代理启动: dry_run={}, scan_concurrency={}, ai_batch_size={}",
        settings.dry_run, settings.scan_concurrency, settings.ai_batch_size
    );

    // AI 提供商可缺省：路由器会降级到规则模式
    let ai_trader = match create_provider(&settings) {
        Ok(provider) => {
            info!("AI提供商就绪: provider={}, model={}", provider.provider(), provider.model());
            Some(Arc::new(AiTrader::new(provider, store.clone(), settings.clone())))
        }
        Err(e) => {
            warn!("AI提供商不可用: {}", e);
            None
        }
    };

    let rule_strategy: Arc<dyn Strategy> =
        Arc::new(RsiReversalStrategy::new(settings.rsi_oversold, settings.rsi_overbought));

    let bus = SignalBus::new(store.clone(), settings.clone());
    let scanner = Scanner::new(ctx.clone());
    let router =
        Arc::new(DecisionRouter::new(ctx.clone(), ai_trader, rule_strategy, bus.clone()));

    let mut supervisor = Supervisor::new();
    let shutting_down = supervisor.shutdown_signal();
    let engine = ExecutionEngine::new(ctx.clone(), shutting_down.clone());

    {
        let ctx = ctx.clone();
        let scanner = scanner.clone();
        let router = router.clone();
        let shutting_down = shutting_down.clone();
        let shutdown_tx = supervisor_subscriber(&supervisor);
        supervisor.spawn("market_analysis", move || {
            run_analysis_loop(
                ctx.clone(),
                scanner.clone(),
                router.clone(),
                shutting_down.clone(),
                shutdown_tx(),
            )
        });
    }

    {
        let engine = engine.clone();
        let bus = bus.clone();
        let shutting_down = shutting_down.clone();
        let shutdown_tx = supervisor_subscriber(&supervisor);
        supervisor.spawn("trade_executor", move || {
            run_execution_loop(engine.clone(), bus.clone(), shutting_down.clone(), shutdown_tx())
        });
    }

    {
        let engine = engine.clone();
        let interval = settings.sltp_guard_interval_sec;
        let shutting_down = shutting_down.clone();
        let shutdown_tx = supervisor_subscriber(&supervisor);
        supervisor.spawn("sltp_guard", move || {
            run_guard_loop(engine.clone(), interval, shutting_down.clone(), shutdown_tx())
        });
    }

    {
        let scanner = scanner.clone();
        let shutting_down = shutting_down.clone();
        let shutdown_tx = supervisor_subscriber(&supervisor);
        supervisor.spawn("volatility_pool", move || {
            run_volatility_pool_loop(scanner.clone(), shutting_down.clone(), shutdown_tx())
        });
    }

    info!("✅ 所有服务已启动");

    let signal_name = Supervisor::wait_for_shutdown_signal().await;
    info!("📡 接收到 {} 信号，正在关闭...", signal_name);

    supervisor.shutdown(SHUTDOWN_DEADLINE).await;
    info!("✅ 应用已退出");
    Ok(())
}

/// Redis 不可达时退回进程内存储（本地开发场景），线上应配好 Redis
async fn connect_store(settings: &Settings) -> Arc<dyn Store> {
    match RedisStore::connect(&settings.redis_url()).await {
        Ok(store) => {
            info!("协调存储就绪: redis={}:{}", settings.redis_host, settings.redis_port);
            Arc::new(store)
        }
        Err(e) => {
            warn!("Redis不可达，使用进程内存储（单实例模式）: {}", e);
            Arc::new(MemoryStore::new())
        }
    }
}

/// 返回可重复创建订阅的闭包（任务重启时需要新的接收端）
fn supervisor_subscriber(
    supervisor: &Supervisor,
) -> impl Fn() -> tokio::sync::broadcast::Receiver<()> + Send + 'static {
    let handle = supervisor.sender();
    move || handle.subscribe()
}
