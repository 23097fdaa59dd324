//! 决策路由
//!
//! 为每条通过预过滤的市场快照选择模式（ai / rule）并产出决策；
//! 可执行决策赋予唯一 signal_id 后经总线入队

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use nofx_ai::AiTrader;
use nofx_core::TradeContext;
use nofx_domain::{AccountInfo, Decision, MarketData, Strategy};
use nofx_execution::SignalBus;

pub struct DecisionRouter {
    ctx: TradeContext,
    ai_trader: Option<Arc<AiTrader>>,
    rule_strategy: Arc<dyn Strategy>,
    bus: SignalBus,
    warned_ai_disabled: AtomicBool,
}

impl DecisionRouter {
    pub fn new(
        ctx: TradeContext,
        ai_trader: Option<Arc<AiTrader>>,
        rule_strategy: Arc<dyn Strategy>,
        bus: SignalBus,
    ) -> Self {
        Self { ctx, ai_trader, rule_strategy, bus, warned_ai_disabled: AtomicBool::new(false) }
    }

    /// 预过滤：任一条件命中才值得送去决策
    pub fn should_analyze(&self, md: &MarketData) -> bool {
        let settings = &self.ctx.settings;
        if !settings.ai_prefilter_enabled {
            return true;
        }

        if md.price_change_pct_24h.abs() >= settings.ai_prefilter_min_abs_pct_24h {
            return true;
        }
        if md.open_interest_change.abs() >= settings.ai_prefilter_min_abs_oi_change {
            return true;
        }
        if md.volume_peak_ratio >= settings.ai_prefilter_min_volume_peak_ratio {
            return true;
        }
        if md.consecutive_count >= settings.ai_prefilter_min_consecutive_count {
            return true;
        }
        if md.bb.map(|bb| bb.squeeze).unwrap_or(false) {
            return true;
        }

        false
    }

    /// 处理一条市场快照，返回是否产生了可执行动作
    pub async fn process_market_data(&self, md: &MarketData) -> bool {
        let symbol = md.symbol.clone();

        if md.current_price > 0.0 {
            info!("收到行情: symbol={}, price={}", symbol, md.current_price);
        } else {
            info!("收到行情: symbol={}", symbol);
        }

        let mut mode = self.ai_mode().await;
        if mode == "ai" && self.ai_trader.is_none() {
            if !self.warned_ai_disabled.swap(true, Ordering::AcqRel) {
                warn!("AI未配置或未启用：已自动降级到规则策略模式（rule）");
            }
            mode = "rule";
        }

        let decision = match (mode, &self.ai_trader) {
            ("ai", Some(trader)) => {
                let mut enriched = md.clone();
                enriched.account = self.account_snapshot().await;
                match trader.make_decision(&enriched).await {
                    Ok(decision) => decision,
                    Err(e) => {
                        warn!("AI决策失败: symbol={}, error={}", symbol, e);
                        return false;
                    }
                }
            }
            _ => {
                let decision = self.rule_strategy.decide(md);
                self.save_rule_decision(&symbol, &decision).await;
                decision
            }
        };

        let actionable = decision.action.is_actionable();
        if let (true, Some(mut signal)) = (actionable, decision.signal) {
            signal.assign_id();
            signal.timestamp = Utc::now().timestamp();

            if let Err(e) = self.bus.publish_signal(&signal).await {
                warn!("信号入队失败: symbol={}, error={}", symbol, e);
                return false;
            }

            info!(
                "信号已推送到队列: symbol={}, action={}, signal_id={}",
                symbol,
                signal.action.as_str(),
                signal.signal_id
            );
            return true;
        }

        info!(
            "信号处理完成: symbol={}, action={}, reason={}",
            symbol,
            decision.action.as_str(),
            decision.reason
        );
        false
    }

    /// 模式选择：store 里的 ai_mode 优先；
    /// 否则有可用 AI 提供商用 ai，反之 rule
    async fn ai_mode(&self) -> &'static str {
        if let Ok(Some(mode)) = self.ctx.store.get("ai_mode").await {
            match mode.as_str() {
                "ai" => return "ai",
                "rule" => return "rule",
                _ => {}
            }
        }

        if self.ai_trader.is_some() || self.ctx.settings.any_ai_enabled() {
            "ai"
        } else {
            "rule"
        }
    }

    /// 账户快照（附加给 AI 的上下文），取不到就省略
    async fn account_snapshot(&self) -> Option<AccountInfo> {
        let balance = self.ctx.exchange.get_balance().await.ok()?;
        let positions = self.ctx.exchange.get_positions().await.unwrap_or_default();

        Some(AccountInfo {
            balance: serde_json::to_value(balance).ok(),
            positions: positions
                .iter()
                .filter_map(|p| serde_json::to_value(p).ok())
                .collect(),
        })
    }

    /// 规则模式的决策也入历史与统计，与 AI 决策同等可观测
    async fn save_rule_decision(&self, symbol: &str, decision: &Decision) {
        let settings = &self.ctx.settings;

        let record = json!({
            "symbol": symbol,
            "timestamp": Utc::now().timestamp(),
            "action": decision.action.as_str(),
            "decision": decision.action.as_str(),
            "full_decision": decision.detail,
        });

        let key = "ai_decision_history";
        if self.ctx.store.lpush(key, &record.to_string()).await.is_ok() {
            let max_len = settings.ai_decision_history_max_len.max(1);
            let _ = self.ctx.store.ltrim(key, 0, (max_len - 1) as isize).await;
        }

        let fields: Vec<(String, String)> = vec![
            ("ts".to_string(), Utc::now().timestamp().to_string()),
            ("symbol".to_string(), symbol.to_string()),
            ("ok".to_string(), "1".to_string()),
            ("action".to_string(), decision.action.as_str().to_string()),
            ("model".to_string(), "rule".to_string()),
            ("latency_ms".to_string(), "0".to_string()),
            ("attempts".to_string(), "0".to_string()),
        ];
        if self.ctx.store.hset("ai_api_stats", &fields).await.is_ok() {
            let ttl = Duration::from_secs(settings.ai_stats_ttl_sec.max(1) as u64);
            let _ = self.ctx.store.expire("ai_api_stats", ttl).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nofx_core::cache::MemoryStore;
    use nofx_core::Settings;
    use nofx_domain::{BollingerBands, Exchange, Store};
    use nofx_strategies::RsiReversalStrategy;

    struct NoopExchange;

    #[async_trait::async_trait]
    impl Exchange for NoopExchange {
        async fn get_klines(
            &self,
            _: &str,
            _: &str,
            _: usize,
        ) -> anyhow::Result<Vec<nofx_domain::Ohlcv>> {
            Ok(Vec::new())
        }
        async fn get_ticker_price(&self, _: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn get_ticker_24h(&self, _: &str) -> anyhow::Result<nofx_domain::Ticker24h> {
            Ok(Default::default())
        }
        async fn get_funding_rate(&self, _: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn get_open_interest(&self, _: &str) -> anyhow::Result<f64> {
            Ok(0.0)
        }
        async fn get_usdt_perpetual_symbols(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn get_market_info(&self, _: &str) -> anyhow::Result<nofx_domain::MarketInfo> {
            Ok(Default::default())
        }
        async fn place_order(
            &self,
            _: &nofx_domain::OrderRequest,
        ) -> anyhow::Result<nofx_domain::Order> {
            anyhow::bail!("not used")
        }
        async fn cancel_order(&self, _: &str, _: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_order(&self, _: &str, _: &str) -> anyhow::Result<nofx_domain::Order> {
            anyhow::bail!("not used")
        }
        async fn get_open_orders(&self, _: &str) -> anyhow::Result<Vec<nofx_domain::Order>> {
            Ok(Vec::new())
        }
        async fn get_position(&self, _: &str) -> anyhow::Result<Option<nofx_domain::Position>> {
            Ok(None)
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<nofx_domain::Position>> {
            Ok(Vec::new())
        }
        async fn get_balance(&self) -> anyhow::Result<nofx_domain::Balance> {
            Ok(Default::default())
        }
    }

    fn router(settings: Settings) -> (DecisionRouter, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let settings = Arc::new(settings);
        let ctx = TradeContext::new(
            store.clone() as Arc<dyn Store>,
            Arc::new(NoopExchange),
            settings.clone(),
        );
        let bus = SignalBus::new(store.clone() as Arc<dyn Store>, settings);
        (
            DecisionRouter::new(ctx, None, Arc::new(RsiReversalStrategy::default()), bus),
            store,
        )
    }

    #[tokio::test]
    async fn test_prefilter_thresholds() {
        let (router, _) = router(Settings::from_env());

        let mut md = MarketData::default();
        md.symbol = "BTCUSDT".to_string();
        assert!(!router.should_analyze(&md));

        md.price_change_pct_24h = -1.2;
        assert!(router.should_analyze(&md));
        md.price_change_pct_24h = 0.0;

        md.open_interest_change = 2.5;
        assert!(router.should_analyze(&md));
        md.open_interest_change = 0.0;

        md.volume_peak_ratio = 1.2;
        assert!(router.should_analyze(&md));
        md.volume_peak_ratio = 0.0;

        md.consecutive_count = 3;
        assert!(router.should_analyze(&md));
        md.consecutive_count = 0;

        md.bb = Some(BollingerBands { upper: 1.0, middle: 1.0, lower: 1.0, squeeze: true });
        assert!(router.should_analyze(&md));
    }

    #[tokio::test]
    async fn test_prefilter_disabled_passes_everything() {
        let mut settings = Settings::from_env();
        settings.ai_prefilter_enabled = false;
        let (router, _) = router(settings);
        assert!(router.should_analyze(&MarketData::default()));
    }

    #[tokio::test]
    async fn test_rule_mode_publishes_actionable_signal() {
        let (router, store) = router(Settings::from_env());

        // RSI 25 -> open_long
        let mut md = MarketData::default();
        md.symbol = "BTCUSDT".to_string();
        md.current_price = 50000.0;
        md.rsi = 25.0;

        let acted = router.process_market_data(&md).await;
        assert!(acted);

        // 信号三处落点：最新键、历史、队列
        assert!(store.get("signal:BTCUSDT").await.unwrap().is_some());
        assert_eq!(store.lrange("signal_history", 0, -1).await.unwrap().len(), 1);
        let queued = store.lrange("trade_queue", 0, -1).await.unwrap();
        assert_eq!(queued.len(), 1);
        let signal: nofx_domain::Signal = serde_json::from_str(&queued[0]).unwrap();
        assert!(!signal.signal_id.is_empty());

        // 中性 RSI 不动作
        md.rsi = 50.0;
        assert!(!router.process_market_data(&md).await);
        assert_eq!(store.lrange("trade_queue", 0, -1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mode_override_from_store() {
        let (router, store) = router(Settings::from_env());
        store.set("ai_mode", "rule", None).await.unwrap();
        assert_eq!(router.ai_mode().await, "rule");

        store.set("ai_mode", "nonsense", None).await.unwrap();
        // 非法值回落到默认：无 AI 配置时为 rule
        assert_eq!(router.ai_mode().await, "rule");
    }
}
