use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::debug;

use edge_core::models::{CategoryValue, ConfigCategory};

/// 缓存中的配置分类
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub category: ConfigCategory,
    /// 每次经由缓存读写时刷新
    pub date_accessed: DateTime<Utc>,
    /// 单调递增的访问序号，时间戳相同时序号小者先被淘汰
    sequence: u64,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_entries: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    next_sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl CacheInner {
    fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }
}

/// 配置分类缓存
///
/// 容量有界，按 `date_accessed` 淘汰最久未访问的条目。
/// 命中/未命中计数只由 [`get`](Self::get) 更新，`contains`、`update`、`remove` 不影响计数。
#[derive(Debug)]
pub struct ConfigurationCache {
    inner: RwLock<CacheInner>,
    max_cache_size: usize,
}

impl ConfigurationCache {
    pub fn new(max_cache_size: usize) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            max_cache_size: max_cache_size.max(1),
        }
    }

    pub fn max_cache_size(&self) -> usize {
        self.max_cache_size
    }

    /// 是否存在该分类，不刷新访问时间
    pub fn contains(&self, category_name: &str) -> bool {
        self.inner
            .read()
            .map(|inner| inner.entries.contains_key(category_name))
            .unwrap_or(false)
    }

    /// 插入或刷新一个分类
    pub fn update(
        &self,
        category_name: &str,
        description: &str,
        value: CategoryValue,
        display_name: Option<&str>,
    ) {
        let Ok(mut inner) = self.inner.write() else {
            return;
        };

        if !inner.entries.contains_key(category_name) && inner.entries.len() >= self.max_cache_size {
            Self::evict_oldest(&mut inner);
        }

        let sequence = inner.next_sequence();
        let entry = CacheEntry {
            category: ConfigCategory::new(category_name, description, value, display_name),
            date_accessed: Utc::now(),
            sequence,
        };
        inner.entries.insert(category_name.to_string(), entry);
    }

    /// 读取分类并刷新访问时间
    pub fn get(&self, category_name: &str) -> Option<ConfigCategory> {
        let mut inner = self.inner.write().ok()?;
        let sequence = inner.next_sequence();

        let found = inner.entries.get_mut(category_name).map(|entry| {
            entry.date_accessed = Utc::now();
            entry.sequence = sequence;
            entry.category.clone()
        });

        if found.is_some() {
            inner.hits += 1;
            counter!("edge_config_cache_hits_total").increment(1);
        } else {
            inner.misses += 1;
            counter!("edge_config_cache_misses_total").increment(1);
        }
        found
    }

    /// 删除分类，不存在时无操作
    pub fn remove(&self, category_name: &str) {
        if let Ok(mut inner) = self.inner.write() {
            inner.entries.remove(category_name);
        }
    }

    pub fn size(&self) -> usize {
        self.inner.read().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn hit(&self) -> u64 {
        self.inner.read().map(|inner| inner.hits).unwrap_or(0)
    }

    pub fn miss(&self) -> u64 {
        self.inner.read().map(|inner| inner.misses).unwrap_or(0)
    }

    pub fn entry(&self, category_name: &str) -> Option<CacheEntry> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.entries.get(category_name).cloned())
    }

    pub fn stats(&self) -> CacheStats {
        let Ok(inner) = self.inner.read() else {
            return CacheStats::default();
        };
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            total_entries: inner.entries.len(),
            hit_rate: if lookups > 0 {
                inner.hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    fn evict_oldest(inner: &mut CacheInner) {
        let oldest = inner
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.date_accessed, entry.sequence))
            .map(|(name, _)| name.clone());

        if let Some(name) = oldest {
            inner.entries.remove(&name);
            inner.evictions += 1;
            counter!("edge_config_cache_evictions_total").increment(1);
            debug!("配置缓存已满，淘汰分类: {}", name);
        }
    }
}
