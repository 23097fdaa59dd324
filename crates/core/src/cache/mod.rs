//! 协调存储实现
//!
//! - `RedisStore`: 生产实现，多路复用异步连接
//! - `MemoryStore`: 进程内实现，测试与无 Redis 的本地运行使用

pub mod memory_store;
pub mod redis_store;

pub use memory_store::MemoryStore;
pub use redis_store::RedisStore;
