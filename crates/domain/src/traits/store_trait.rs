//! 协调存储抽象
//!
//! 对应标准 KV 存储语义（string/list/set/hash + 过期 + 原子 SETNX +
//! 脚本化 CAS 删除）。所有键在实现侧统一加 `nofx:` 前缀。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// SET，`ttl` 为 None 时不过期
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// 原子 SETNX + EX：键不存在时写入并设置过期，返回是否写入成功
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    async fn del(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// 头部插入
    async fn lpush(&self, key: &str, value: &str) -> Result<()>;

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    /// 裁剪列表到 [start, stop]，与 LPUSH 配合实现有界列表
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()>;

    async fn lindex(&self, key: &str, index: isize) -> Result<Option<String>>;

    /// 阻塞式尾部弹出，超时返回 None
    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    async fn sadd(&self, key: &str, members: &[String]) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;

    /// 游标式按模式扫描（每批 `count` 个），从不做全键空间枚举
    async fn scan_match(&self, pattern: &str, count: usize) -> Result<Vec<String>>;

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// 脚本化 CAS 删除：`if get(key)==expected then del(key)`，
    /// 用于分布式锁释放，必须原子执行。返回是否实际删除
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}
