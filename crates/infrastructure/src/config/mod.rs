//! # 配置分类
//!
//! 有界的配置分类缓存，以及基于缓存和 `CategoryRepository` 的配置管理器。

pub mod config_cache;
pub mod manager;

pub use config_cache::{CacheEntry, CacheStats, ConfigurationCache};
pub use manager::ConfigurationManager;
