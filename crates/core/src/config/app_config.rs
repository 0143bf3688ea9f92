use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::sections::{
    validate_not_empty, validate_positive, CacheConfig, DatabaseConfig, LoggingConfig,
    MetricsConfig, MonitorConfig, SchedulerConfig, TransportConfig,
};
use crate::{EdgeError, EdgeResult};

/// 控制面完整配置
///
/// 加载顺序（后者覆盖前者）：内置默认值 → TOML 配置文件 → `EDGE__` 前缀的环境变量，
/// 例如 `EDGE__MONITOR__MAX_ATTEMPTS=3`。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub monitor: MonitorConfig,
    pub cache: CacheConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("生成默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/edge.toml", "edge.toml", "/etc/edge/edge.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("EDGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> EdgeResult<()> {
        validate_not_empty(&self.database.url, "database.url")?;
        validate_positive(u64::from(self.database.max_connections), "database.max_connections")?;

        validate_positive(self.scheduler.tick_interval_ms, "scheduler.tick_interval_ms")?;
        validate_positive(self.scheduler.purge_interval_seconds, "scheduler.purge_interval_seconds")?;

        validate_positive(self.monitor.sleep_interval_seconds, "monitor.sleep_interval_seconds")?;
        validate_positive(self.monitor.ping_timeout_seconds, "monitor.ping_timeout_seconds")?;
        validate_positive(u64::from(self.monitor.max_attempts), "monitor.max_attempts")?;

        validate_positive(self.cache.max_cache_size as u64, "cache.max_cache_size")?;

        if !self.transport.path_prefix.is_empty() && !self.transport.path_prefix.starts_with('/') {
            return Err(EdgeError::Configuration(format!(
                "transport.path_prefix 必须以 / 开头: {}",
                self.transport.path_prefix
            )));
        }
        validate_positive(self.transport.delivery_timeout_ms, "transport.delivery_timeout_ms")?;

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(EdgeError::Configuration(format!(
                "不支持的日志格式: {}. 可选: {:?}",
                self.logging.format, valid_formats
            )));
        }
        if self.metrics.enabled {
            self.metrics
                .listen_address
                .parse::<std::net::SocketAddr>()
                .map_err(|e| {
                    EdgeError::Configuration(format!(
                        "metrics.listen_address 无效: {} ({e})",
                        self.metrics.listen_address
                    ))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.monitor.max_attempts, 15);
        assert_eq!(config.monitor.retry_delay_ms, 1500);
        assert_eq!(config.cache.max_cache_size, 30);
        assert_eq!(config.transport.path_prefix, "/edge");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_partial_toml() {
        let toml_str = r#"
[monitor]
sleep_interval_seconds = 10
max_attempts = 3

[cache]
max_cache_size = 2
"#;

        let config = AppConfig::from_toml(toml_str).expect("Failed to parse TOML");
        assert_eq!(config.monitor.sleep_interval_seconds, 10);
        assert_eq!(config.monitor.max_attempts, 3);
        // 未给出的字段回落到默认值
        assert_eq!(config.monitor.ping_timeout_seconds, 1);
        assert_eq!(config.cache.max_cache_size, 2);
        assert_eq!(config.scheduler.tick_interval_ms, 1000);
    }

    #[test]
    fn test_app_config_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.cache.max_cache_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transport.path_prefix = "edge".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.metrics.enabled = true;
        config.metrics.listen_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        writeln!(
            file,
            "[scheduler]\ntick_interval_ms = 250\n\n[database]\nurl = \"sqlite::memory:\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).expect("load config");
        assert_eq!(config.scheduler.tick_interval_ms, 250);
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.monitor.max_attempts, 15);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/edge.toml")).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.monitor.max_attempts, config.monitor.max_attempts);
        assert_eq!(parsed.database.url, config.database.url);
    }
}
