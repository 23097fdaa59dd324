//! 分布式锁
//!
//! SETNX + TTL 获取，Lua CAS 删除释放（防止释放他人续占的锁）。
//! 正确性前提：TTL 大于临界区时长且进程不会停顿超过 TTL；
//! 更长的临界区需要续租，当前没有这样的调用方

use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::RngCore;
use tracing::debug;

use crate::engine::ExecutionEngine;

impl ExecutionEngine {
    /// 获取分布式锁，返回 128 位随机 token
    pub(crate) async fn acquire_lock(&self, key: &str, ttl: Duration) -> Result<String> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let acquired = self
            .ctx
            .store
            .set_nx(key, &token, ttl)
            .await
            .map_err(|e| anyhow!("获取锁失败: {}", e))?;

        if !acquired {
            return Err(anyhow!("锁已被占用"));
        }

        Ok(token)
    }

    /// 释放锁：只删除 token 仍匹配的键
    pub(crate) async fn release_lock(&self, key: &str, token: &str) {
        match self.ctx.store.compare_and_delete(key, token).await {
            Ok(false) => debug!("锁已过期或被他人持有，跳过释放: key={}", key),
            Ok(true) => {}
            Err(e) => debug!("释放锁失败: key={}, error={}", key, e),
        }
    }
}
