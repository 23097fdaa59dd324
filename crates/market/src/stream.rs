//! 流式扫描
//!
//! 有限、不可重启的惰性序列：每个币种一个受信号量约束的任务，
//! 结果进入容量 2×并发度的通道；全部完成或取消触发后通道关闭

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use nofx_domain::MarketData;

use crate::scanner::Scanner;

impl Scanner {
    /// 流式扫描市场。`shutting_down` 置位后不再派发新任务，
    /// 在途任务完成后通道关闭
    pub async fn scan_stream(
        &self,
        force_full: bool,
        shutting_down: Arc<AtomicBool>,
    ) -> Result<mpsc::Receiver<MarketData>> {
        let symbols = self.get_pool(force_full).await?;
        if symbols.is_empty() {
            warn!("No symbols to scan");
            return Err(anyhow!("no symbols to scan"));
        }

        let concurrency = self.ctx.settings.scan_concurrency.max(1);
        info!(
            "Starting stream scan: symbol_count={}, force_full={}, concurrency={}",
            symbols.len(),
            force_full,
            concurrency
        );

        let (tx, rx) = mpsc::channel::<MarketData>(concurrency * 2);
        let scanner = self.clone();

        tokio::spawn(async move {
            let semaphore = Arc::new(Semaphore::new(concurrency));
            let mut handles = Vec::with_capacity(symbols.len());

            for symbol in symbols {
                if shutting_down.load(Ordering::Acquire) {
                    break;
                }

                let Ok(permit) = semaphore.clone().acquire_owned().await else { break };
                let scanner = scanner.clone();
                let tx = tx.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    match scanner.scan_symbol(&symbol).await {
                        Ok(data) => {
                            // 消费端关闭时静默结束
                            let _ = tx.send(data).await;
                        }
                        Err(e) => {
                            debug!("Scan symbol failed: symbol={}, error={}", symbol, e);
                        }
                    }
                }));
            }

            for handle in handles {
                let _ = handle.await;
            }
            // tx 在此 drop，通道关闭
        });

        Ok(rx)
    }

    /// 收集式扫描：吃完整条流，并把扫到的币种并入 symbol_pool
    pub async fn scan_collected(
        &self,
        force_full: bool,
        shutting_down: Arc<AtomicBool>,
    ) -> Result<Vec<MarketData>> {
        let mut rx = self.scan_stream(force_full, shutting_down).await?;

        let mut results = Vec::new();
        let mut active_symbols = Vec::new();
        while let Some(data) = rx.recv().await {
            if !data.symbol.is_empty() {
                active_symbols.push(data.symbol.clone());
            }
            results.push(data);
        }

        if !active_symbols.is_empty() {
            if let Err(e) = self.update_symbol_pool(&active_symbols).await {
                warn!("更新币种池失败: {}", e);
            }
        }

        Ok(results)
    }
}
