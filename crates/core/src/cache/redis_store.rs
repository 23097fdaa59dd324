//! Redis 协调存储实现
//!
//! 所有键在本层统一加 `nofx:` 前缀，调用方只使用逻辑键名；
//! `scan_match` 返回前会把前缀剥掉，保证上层与实现无关。

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use nofx_domain::Store;

use crate::config::{redis_key, REDIS_KEY_PREFIX};

/// 锁释放用的 CAS 删除脚本，原子执行
const CAS_DELETE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// 创建并验证连接
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| anyhow!("Failed to create Redis client: {}", e))?;

        // 测试连接
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to Redis at {}: {}", redis_url, e))?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;

        debug!("Redis连接初始化成功");
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to get multiplexed connection: {}", e))
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(redis_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.conn().await?;
        match ttl {
            Some(ttl) if !ttl.is_zero() => {
                conn.set_ex::<_, _, ()>(redis_key(key), value, ttl.as_secs().max(1)).await?
            }
            _ => conn.set::<_, _, ()>(redis_key(key), value).await?,
        }
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        // SET key value NX EX ttl：单命令保证原子性
        let result: Option<String> = redis::cmd("SET")
            .arg(redis_key(key))
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(redis_key(key)).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = conn.exists(redis_key(key)).await?;
        Ok(exists)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.expire::<_, ()>(redis_key(key), ttl.as_secs().max(1) as i64).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.lpush::<_, _, ()>(redis_key(key), value).await?;
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let items: Vec<String> = conn.lrange(redis_key(key), start, stop).await?;
        Ok(items)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.ltrim::<_, ()>(redis_key(key), start, stop).await?;
        Ok(())
    }

    async fn lindex(&self, key: &str, index: isize) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.lindex(redis_key(key), index).await?;
        Ok(value)
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let result: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(redis_key(key))
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;
        Ok(result.map(|(_, value)| value))
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.sadd::<_, _, ()>(redis_key(key), members).await?;
        Ok(())
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = conn.smembers(redis_key(key)).await?;
        Ok(members)
    }

    async fn scan_match(&self, pattern: &str, count: usize) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let full_pattern = redis_key(pattern);
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full_pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;
            for key in batch {
                keys.push(key.strip_prefix(REDIS_KEY_PREFIX).unwrap_or(&key).to_string());
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        Ok(keys)
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        conn.hset_multiple::<_, _, _, ()>(redis_key(key), fields).await?;
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let deleted: i64 = Script::new(CAS_DELETE_SCRIPT)
            .key(redis_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}
