use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EdgeError, EdgeResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://edge.db".to_string(),
            max_connections: 5,
        }
    }
}

/// 调度器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 触发循环的节拍（毫秒）
    pub tick_interval_ms: u64,
    /// stop 时等待运行中任务退出的最长时间（秒）
    pub shutdown_timeout_seconds: u64,
    /// 取消请求发出后到强制结束进程的宽限期（秒）
    pub cancel_grace_period_seconds: u64,
    /// 已结束任务的保留天数
    pub max_completed_task_age_days: u32,
    /// 清理已结束任务的周期（秒）
    pub purge_interval_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            shutdown_timeout_seconds: 30,
            cancel_grace_period_seconds: 5,
            max_completed_task_age_days: 30,
            purge_interval_seconds: 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn cancel_grace_period(&self) -> Duration {
        Duration::from_secs(self.cancel_grace_period_seconds)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }

    pub fn max_completed_task_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_completed_task_age_days))
    }
}

/// 服务健康监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 两轮完整探测之间的休眠时间（秒）
    pub sleep_interval_seconds: u64,
    /// 单次 ping 的超时时间（秒）
    pub ping_timeout_seconds: u64,
    /// 判定服务失效前的最大尝试次数
    pub max_attempts: u32,
    /// 两次尝试之间的间隔（毫秒）
    pub retry_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sleep_interval_seconds: 5,
            ping_timeout_seconds: 1,
            max_attempts: 15,
            retry_delay_ms: 1500,
        }
    }
}

impl MonitorConfig {
    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_seconds)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_cache_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_cache_size: 30 }
    }
}

/// 变更通知与服务探测使用的 HTTP 传输配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 管理接口路径前缀，ping 为 `{prefix}/service/ping`，变更通知为 `{prefix}/change`
    pub path_prefix: String,
    pub connect_timeout_ms: u64,
    /// 单个订阅方的投递超时（毫秒）
    pub delivery_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/edge".to_string(),
            connect_timeout_ms: 1000,
            delivery_timeout_ms: 5000,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" 或 "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "0.0.0.0:9898".to_string(),
        }
    }
}

pub(crate) fn validate_positive(value: u64, field: &str) -> EdgeResult<()> {
    if value == 0 {
        return Err(EdgeError::Configuration(format!("{field} 必须大于0")));
    }
    Ok(())
}

pub(crate) fn validate_not_empty(value: &str, field: &str) -> EdgeResult<()> {
    if value.trim().is_empty() {
        return Err(EdgeError::Configuration(format!("{field} 不能为空")));
    }
    Ok(())
}
