//! 币种池维护
//!
//! 扫描宇宙优先取波动率池（24h 涨跌幅绝对值 top-N），
//! 为空或强制全量时回退到全部 USDT 永续合约并按上市天数过滤

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::scanner::Scanner;

const VOLATILITY_POOL_KEY: &str = "volatility_pool";
const SYMBOL_POOL_KEY: &str = "symbol_pool";

/// 波动率刷新时对 ticker 接口的并发上限
const VOLATILITY_FETCH_CONCURRENCY: usize = 20;

impl Scanner {
    /// 获取扫描宇宙
    pub async fn get_pool(&self, force_full: bool) -> Result<Vec<String>> {
        if !force_full {
            let pool = self.get_volatility_pool().await;
            if !pool.is_empty() {
                info!("Using volatility pool: count={}", pool.len());
                return Ok(pool);
            }
        }

        let all_symbols = self
            .ctx
            .exchange
            .get_usdt_perpetual_symbols()
            .await
            .map_err(|e| anyhow!("failed to get USDT symbols: {}", e))?;

        let filtered = self
            .filter_symbols_by_online_days(&all_symbols, self.ctx.settings.binance_min_online_days)
            .await;

        info!("Using full symbol pool: total={}, filtered={}", all_symbols.len(), filtered.len());

        Ok(filtered)
    }

    async fn get_volatility_pool(&self) -> Vec<String> {
        self.ctx.store.smembers(VOLATILITY_POOL_KEY).await.unwrap_or_default()
    }

    /// 只保留上市时间 ≥ min_days 的合约；
    /// 上市时间未知或取不到的保守保留
    async fn filter_symbols_by_online_days(
        &self,
        symbols: &[String],
        min_days: i64,
    ) -> Vec<String> {
        if min_days <= 0 {
            return symbols.to_vec();
        }

        let now_ms = Utc::now().timestamp_millis();
        let min_online_ms = min_days * 24 * 60 * 60 * 1000;

        let mut filtered = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.ctx.exchange.get_market_info(symbol).await {
                Ok(info) => match info.onboard_date {
                    Some(onboard_ms) if now_ms - onboard_ms < min_online_ms => {}
                    _ => filtered.push(symbol.clone()),
                },
                Err(_) => filtered.push(symbol.clone()),
            }
        }
        filtered
    }

    /// 将扫描出的活跃币种并入 symbol_pool 集合（收集式扫描的显式策略）
    pub async fn update_symbol_pool(&self, active_symbols: &[String]) -> Result<()> {
        if active_symbols.is_empty() {
            return Ok(());
        }
        let ttl = Duration::from_secs(self.ctx.settings.symbol_pool_ttl_sec.max(1) as u64);
        self.ctx.store.sadd(SYMBOL_POOL_KEY, active_symbols).await?;
        self.ctx.store.expire(SYMBOL_POOL_KEY, ttl).await?;
        Ok(())
    }

    /// 刷新波动率池：并发拉全量 24h ticker，按 |涨跌幅| 降序取
    /// `ai_batch_size × 10` 个，DEL + SADD + EXPIRE 写回
    pub async fn update_volatility_pool(&self) -> Result<Vec<String>> {
        let all_symbols = self
            .ctx
            .exchange
            .get_usdt_perpetual_symbols()
            .await
            .map_err(|e| anyhow!("failed to get USDT symbols: {}", e))?;

        info!("Calculating volatility: total_symbols={}", all_symbols.len());

        let semaphore = Arc::new(Semaphore::new(VOLATILITY_FETCH_CONCURRENCY));
        let mut handles = Vec::with_capacity(all_symbols.len());

        for symbol in all_symbols {
            let semaphore = semaphore.clone();
            let exchange = self.ctx.exchange.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let volatility = match exchange.get_ticker_24h(&symbol).await {
                    Ok(t) => t.price_change_percent.abs(),
                    Err(_) => 0.0,
                };
                Some((symbol, volatility))
            }));
        }

        let mut symbol_volatility = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Some(pair)) => symbol_volatility.push(pair),
                Ok(None) => {}
                Err(e) => warn!("波动率计算任务异常: {}", e),
            }
        }

        symbol_volatility
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let pool_size = (self.ctx.settings.ai_batch_size * 10).min(symbol_volatility.len());
        let top_symbols: Vec<String> =
            symbol_volatility[..pool_size].iter().map(|(s, _)| s.clone()).collect();

        let ttl = Duration::from_secs(self.ctx.settings.symbol_pool_ttl_sec.max(1) as u64);
        self.ctx.store.del(VOLATILITY_POOL_KEY).await?;
        if !top_symbols.is_empty() {
            self.ctx.store.sadd(VOLATILITY_POOL_KEY, &top_symbols).await?;
            self.ctx.store.expire(VOLATILITY_POOL_KEY, ttl).await?;
        }

        if let Some((_, top)) = symbol_volatility.first() {
            info!("Volatility pool updated: count={}, top_volatility={:.2}", top_symbols.len(), top);
        }

        Ok(top_symbols)
    }
}
