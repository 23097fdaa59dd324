//! 进程内协调存储实现
//!
//! 语义与 Redis 实现对齐：惰性过期、原子 SETNX、CAS 删除、
//! 带超时的 BRPOP。测试与无 Redis 的本地运行使用。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use nofx_domain::Store;

#[derive(Debug, Clone)]
enum ValueKind {
    Str(String),
    List(VecDeque<String>),
    Set(HashSet<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: ValueKind,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
    /// LPUSH 时唤醒 BRPOP 等待者
    notify: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn purge_if_expired(map: &mut HashMap<String, Entry>, key: &str) {
        if map.get(key).map(Entry::expired).unwrap_or(false) {
            map.remove(key);
        }
    }
}

/// 仅支持 `*` 通配的模式匹配，覆盖协调存储契约中用到的模式形态
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }
    let mut rest = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        match map.get(key) {
            Some(Entry { value: ValueKind::Str(s), .. }) => Ok(Some(s.clone())),
            Some(_) => Err(anyhow!("WRONGTYPE: {} is not a string", key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_string(),
            Entry {
                value: ValueKind::Str(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: ValueKind::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.inner.lock().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        Ok(map.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<()> {
        let mut map = self.inner.lock().await;
        if let Some(entry) = map.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut map = self.inner.lock().await;
            Self::purge_if_expired(&mut map, key);
            let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
                value: ValueKind::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut entry.value {
                ValueKind::List(list) => list.push_front(value.to_string()),
                _ => return Err(anyhow!("WRONGTYPE: {} is not a list", key)),
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        let list = match map.get(key) {
            Some(Entry { value: ValueKind::List(list), .. }) => list,
            Some(_) => return Err(anyhow!("WRONGTYPE: {} is not a list", key)),
            None => return Ok(Vec::new()),
        };
        let len = list.len() as isize;
        let norm = |i: isize| -> isize { if i < 0 { (len + i).max(0) } else { i.min(len - 1) } };
        if len == 0 {
            return Ok(Vec::new());
        }
        let (start, stop) = (norm(start), norm(stop));
        if start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<()> {
        let kept = self.lrange(key, start, stop).await?;
        let mut map = self.inner.lock().await;
        if let Some(entry) = map.get_mut(key) {
            entry.value = ValueKind::List(kept.into());
        }
        Ok(())
    }

    async fn lindex(&self, key: &str, index: isize) -> Result<Option<String>> {
        let items = self.lrange(key, index, index).await?;
        Ok(items.into_iter().next())
    }

    async fn brpop(&self, key: &str, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut map = self.inner.lock().await;
                Self::purge_if_expired(&mut map, key);
                if let Some(Entry { value: ValueKind::List(list), .. }) = map.get_mut(key) {
                    if let Some(value) = list.pop_back() {
                        if list.is_empty() {
                            map.remove(key);
                        }
                        return Ok(Some(value));
                    }
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let _ = tokio::time::timeout(remaining, self.notify.notified()).await;
        }
    }

    async fn sadd(&self, key: &str, members: &[String]) -> Result<()> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: ValueKind::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            ValueKind::Set(set) => {
                for m in members {
                    set.insert(m.clone());
                }
                Ok(())
            }
            _ => Err(anyhow!("WRONGTYPE: {} is not a set", key)),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        match map.get(key) {
            Some(Entry { value: ValueKind::Set(set), .. }) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(anyhow!("WRONGTYPE: {} is not a set", key)),
            None => Ok(Vec::new()),
        }
    }

    async fn scan_match(&self, pattern: &str, _count: usize) -> Result<Vec<String>> {
        let mut map = self.inner.lock().await;
        let expired: Vec<String> = map
            .iter()
            .filter(|(_, e)| e.expired())
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            map.remove(&k);
        }
        Ok(map.keys().filter(|k| glob_match(pattern, k)).cloned().collect())
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: ValueKind::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            ValueKind::Hash(hash) => {
                for (f, v) in fields {
                    hash.insert(f.clone(), v.clone());
                }
                Ok(())
            }
            _ => Err(anyhow!("WRONGTYPE: {} is not a hash", key)),
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut map = self.inner.lock().await;
        Self::purge_if_expired(&mut map, key);
        match map.get(key) {
            Some(Entry { value: ValueKind::Str(s), .. }) if s == expected => {
                map.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
