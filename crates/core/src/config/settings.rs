//! 全量配置快照
//!
//! 启动时从环境变量读取一次，随 `TradeContext` 注入各组件，
//! 避免包级单例带来的初始化顺序问题

use super::environment::{env_f64, env_i64, env_is_true, env_or_default};

/// AI 提供商配置
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub enabled: bool,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl ProviderSettings {
    pub fn is_usable(&self) -> bool {
        self.enabled && !self.api_key.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    // Redis
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_password: String,
    pub redis_db: i64,

    // Binance
    pub binance_api_key: String,
    pub binance_secret_key: String,
    pub binance_fapi_base_url: String,
    pub binance_http_timeout_sec: f64,
    pub binance_min_online_days: i64,
    pub exchange_cache_ttl_sec: f64,
    pub rate_limit_rps: f64,
    pub rate_limit_capacity: u32,

    pub dry_run: bool,

    // AI 提供商
    pub ai_provider: String,
    pub deepseek: ProviderSettings,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub ai_temperature: f64,
    pub ai_max_tokens: u32,
    pub ai_trader_system_prompt: String,
    pub strategy_file: String,

    // 扫描
    pub scan_interval_sec: i64,
    pub scan_concurrency: usize,
    pub market_snapshot_ttl_sec: i64,
    pub symbol_pool_ttl_sec: i64,
    pub oi_last_ttl_sec: i64,

    // 信号与队列
    pub signal_ttl_sec: i64,
    pub max_trade_queue_size: i64,
    pub signal_history_max_len: i64,
    pub trade_history_max_len: i64,
    pub ai_decision_history_max_len: i64,

    // 执行引擎
    pub strat_default_notional_usdt: f64,
    pub order_dedupe_window_sec: i64,
    pub order_audit_max_len: i64,
    pub order_audit_event_max_chars: usize,

    // SL/TP 守护
    pub sltp_guard_interval_sec: f64,
    pub guard_concurrency: usize,
    pub protection_ttl_sec: i64,
    pub tp1_partial_ratio: f64,

    // 指标参数
    pub ind_ema_period_20: usize,
    pub ind_ema_period_50: usize,
    pub ind_ema_period_200: usize,
    pub ind_rsi_period: usize,
    pub ind_bb_period: usize,
    pub ind_bb_std_dev: f64,
    pub bb_squeeze_bandwidth: f64,

    // 规则策略阈值
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,

    // AI 批量分析
    pub ai_analysis_interval_sec: i64,
    pub ai_batch_size: usize,
    pub ai_force_full_pool_when_no_action: bool,
    pub ai_stats_ttl_sec: i64,

    // AI 预过滤
    pub ai_prefilter_enabled: bool,
    pub ai_prefilter_min_abs_pct_24h: f64,
    pub ai_prefilter_min_abs_oi_change: f64,
    pub ai_prefilter_min_volume_peak_ratio: f64,
    pub ai_prefilter_min_consecutive_count: i64,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            redis_host: env_or_default("REDIS_HOST", "localhost"),
            redis_port: env_i64("REDIS_PORT", 6379) as u16,
            redis_password: env_or_default("REDIS_PASSWORD", ""),
            redis_db: env_i64("REDIS_DB", 0),

            binance_api_key: env_or_default("BINANCE_API_KEY", ""),
            binance_secret_key: env_or_default("BINANCE_SECRET_KEY", ""),
            binance_fapi_base_url: env_or_default(
                "BINANCE_FAPI_BASE_URL",
                "https://fapi.binance.com",
            ),
            binance_http_timeout_sec: env_f64("BINANCE_HTTP_TIMEOUT_SEC", 10.0),
            binance_min_online_days: env_i64("BINANCE_MIN_ONLINE_DAYS", 30),
            exchange_cache_ttl_sec: env_f64("EXCHANGE_CACHE_TTL_SEC", 10.0),
            rate_limit_rps: env_f64("BINANCE_RATE_LIMIT_RPS", 10.0),
            rate_limit_capacity: env_i64("BINANCE_RATE_LIMIT_CAPACITY", 20) as u32,

            dry_run: env_is_true("DRY_RUN", true),

            ai_provider: env_or_default("AI_PROVIDER", "deepseek").to_lowercase(),
            deepseek: ProviderSettings {
                enabled: env_is_true("DEEPSEEK_ENABLED", false),
                api_key: env_or_default("DEEPSEEK_API_KEY", ""),
                base_url: env_or_default("DEEPSEEK_BASE_URL", "https://api.deepseek.com"),
                model: env_or_default("DEEPSEEK_MODEL", "deepseek-chat"),
            },
            openai: ProviderSettings {
                enabled: env_is_true("OPENAI_ENABLED", false),
                api_key: env_or_default("OPENAI_API_KEY", ""),
                base_url: env_or_default("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                model: env_or_default("OPENAI_MODEL", "gpt-4o-mini"),
            },
            gemini: ProviderSettings {
                enabled: env_is_true("GEMINI_ENABLED", false),
                api_key: env_or_default("GEMINI_API_KEY", ""),
                base_url: env_or_default(
                    "GEMINI_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
                model: env_or_default("GEMINI_MODEL", "gemini-pro"),
            },
            ai_temperature: env_f64("AI_TEMPERATURE", 0.3),
            ai_max_tokens: env_i64("AI_MAX_TOKENS", 4000) as u32,
            ai_trader_system_prompt: env_or_default(
                "AI_TRADER_SYSTEM_PROMPT",
                "你是一名经验丰富的加密货币合约交易员，请根据提供的市场数据（包括衍生品与资金数据、技术分析指标）自行分析并做出交易决策。",
            ),
            strategy_file: env_or_default("STRATEGY_FILE", "strategies/default.txt"),

            scan_interval_sec: env_i64("SCAN_INTERVAL", 180),
            scan_concurrency: env_i64("SCAN_CONCURRENCY", 10) as usize,
            market_snapshot_ttl_sec: env_i64("MARKET_SNAPSHOT_TTL_SEC", 600),
            symbol_pool_ttl_sec: env_i64("SYMBOL_POOL_TTL_SEC", 1800),
            oi_last_ttl_sec: env_i64("OI_LAST_TTL_SEC", 3600),

            signal_ttl_sec: env_i64("SIGNAL_TTL_SEC", 3600),
            max_trade_queue_size: env_i64("MAX_TRADE_QUEUE_SIZE", 100),
            signal_history_max_len: env_i64("SIGNAL_HISTORY_MAX_LEN", 500),
            trade_history_max_len: env_i64("TRADE_HISTORY_MAX_LEN", 500),
            ai_decision_history_max_len: env_i64("AI_DECISION_HISTORY_MAX_LEN", 500),

            strat_default_notional_usdt: env_f64("STRAT_DEFAULT_NOTIONAL_USDT", 20.0),
            order_dedupe_window_sec: env_i64("ORDER_DEDUPE_WINDOW", 5),
            order_audit_max_len: env_i64("ORDER_AUDIT_MAX_LEN", 2000),
            order_audit_event_max_chars: env_i64("ORDER_AUDIT_EVENT_MAX_CHARS", 2000) as usize,

            sltp_guard_interval_sec: env_f64("SLTP_GUARD_INTERVAL_SEC", 10.0),
            guard_concurrency: env_i64("GUARD_CONCURRENCY", 4) as usize,
            protection_ttl_sec: env_i64("PROTECTION_TTL_SEC", 86400),
            tp1_partial_ratio: env_f64("TP1_PARTIAL_RATIO", 0.5),

            ind_ema_period_20: env_i64("IND_EMA_PERIOD_20", 20) as usize,
            ind_ema_period_50: env_i64("IND_EMA_PERIOD_50", 50) as usize,
            ind_ema_period_200: env_i64("IND_EMA_PERIOD_200", 200) as usize,
            ind_rsi_period: env_i64("IND_RSI_PERIOD", 14) as usize,
            ind_bb_period: env_i64("IND_BB_PERIOD", 20) as usize,
            ind_bb_std_dev: env_f64("IND_BB_STD_DEV", 2.0),
            bb_squeeze_bandwidth: env_f64("BB_SQUEEZE_BANDWIDTH", 0.01),

            rsi_oversold: env_f64("RSI_OVERSOLD", 30.0),
            rsi_overbought: env_f64("RSI_OVERBOUGHT", 70.0),

            ai_analysis_interval_sec: env_i64("AI_ANALYSIS_INTERVAL_SEC", 180),
            ai_batch_size: env_i64("AI_BATCH_SIZE", 2).max(1) as usize,
            ai_force_full_pool_when_no_action: env_is_true("AI_FORCE_FULL_POOL_WHEN_NO_ACTION", false),
            ai_stats_ttl_sec: env_i64("AI_STATS_TTL_SEC", 86400),

            ai_prefilter_enabled: env_is_true("AI_PREFILTER_ENABLED", true),
            ai_prefilter_min_abs_pct_24h: env_f64("AI_PREFILTER_MIN_ABS_PCT_24H", 0.8),
            ai_prefilter_min_abs_oi_change: env_f64("AI_PREFILTER_MIN_ABS_OI_CHANGE", 2.0),
            ai_prefilter_min_volume_peak_ratio: env_f64("AI_PREFILTER_MIN_VOLUME_PEAK_RATIO", 1.05),
            ai_prefilter_min_consecutive_count: env_i64("AI_PREFILTER_MIN_CONSECUTIVE_COUNT", 2),
        }
    }

    /// Redis 连接串
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}:{}/{}",
                self.redis_password, self.redis_host, self.redis_port, self.redis_db
            )
        }
    }

    /// 任一 AI 提供商可用
    pub fn any_ai_enabled(&self) -> bool {
        self.deepseek.is_usable() || self.openai.is_usable() || self.gemini.is_usable()
    }

    /// 分析周期间隔，下限 10 秒
    pub fn analysis_interval_sec(&self) -> i64 {
        let mut interval = self.ai_analysis_interval_sec;
        if interval <= 0 {
            interval = self.scan_interval_sec;
        }
        interval.max(10)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}
