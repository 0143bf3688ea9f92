//! 配置管理
//!
//! 基于 `config` crate 分层加载 [`AppConfig`]：内置默认值、TOML 文件、环境变量。
//! 各组件只接收与自己相关的配置段（例如 `MonitorConfig`），在启动时读取一次。

pub mod app_config;
pub mod sections;

pub use app_config::AppConfig;
pub use sections::{
    CacheConfig, DatabaseConfig, LoggingConfig, MetricsConfig, MonitorConfig, SchedulerConfig,
    TransportConfig,
};
