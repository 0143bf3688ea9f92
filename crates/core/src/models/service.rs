use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EdgeError, EdgeResult};

/// 已注册的微服务实例
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub name: String,
    pub service_type: ServiceType,
    pub protocol: String,
    pub address: String,
    pub service_port: Option<u16>,
    pub management_port: u16,
    pub status: ServiceStatus,
    pub registered_at: DateTime<Utc>,
}

/// 服务类型（封闭枚举）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServiceType {
    Storage,
    Core,
    Southbound,
    Northbound,
    Notification,
    Management,
    Dispatcher,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Storage => "Storage",
            ServiceType::Core => "Core",
            ServiceType::Southbound => "Southbound",
            ServiceType::Northbound => "Northbound",
            ServiceType::Notification => "Notification",
            ServiceType::Management => "Management",
            ServiceType::Dispatcher => "Dispatcher",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Storage" => Ok(ServiceType::Storage),
            "Core" => Ok(ServiceType::Core),
            "Southbound" => Ok(ServiceType::Southbound),
            "Northbound" => Ok(ServiceType::Northbound),
            "Notification" => Ok(ServiceType::Notification),
            "Management" => Ok(ServiceType::Management),
            "Dispatcher" => Ok(ServiceType::Dispatcher),
            _ => Err(EdgeError::InvalidServiceType(s.to_string())),
        }
    }
}

/// 服务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Shutdown,
    Failed,
    Unresponsive,
}

/// 服务注册请求
///
/// 端口以原始整数形式接收，注册时校验是否为合法的正整数端口。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRegistration {
    pub name: String,
    pub service_type: String,
    pub address: String,
    pub service_port: Option<i64>,
    pub management_port: i64,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "http".to_string()
}

impl ServiceRegistration {
    pub fn new(
        name: &str,
        service_type: &str,
        address: &str,
        service_port: Option<i64>,
        management_port: i64,
    ) -> Self {
        Self {
            name: name.to_string(),
            service_type: service_type.to_string(),
            address: address.to_string(),
            service_port,
            management_port,
            protocol: default_protocol(),
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = protocol.to_string();
        self
    }
}

/// 将原始端口值转换为 u16，拒绝 0、负数和超出范围的值
pub fn parse_port(value: i64, field: &str) -> EdgeResult<u16> {
    if value <= 0 {
        return Err(EdgeError::InvalidPort(format!("{field} 必须为正整数，实际为 {value}")));
    }
    u16::try_from(value)
        .map_err(|_| EdgeError::InvalidPort(format!("{field} 超出端口范围: {value}")))
}

/// 服务查询过滤器，多个条件之间为 AND 关系
#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub id: Option<Uuid>,
    pub name: Option<String>,
    pub service_type: Option<ServiceType>,
}

impl ServiceFilter {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    pub fn by_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn by_type(service_type: ServiceType) -> Self {
        Self {
            service_type: Some(service_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &ServiceRecord) -> bool {
        self.id.map_or(true, |id| record.id == id)
            && self.name.as_ref().map_or(true, |name| &record.name == name)
            && self
                .service_type
                .map_or(true, |service_type| record.service_type == service_type)
    }
}

impl ServiceRecord {
    /// 管理端口上的基础地址，例如 `http://127.0.0.1:40001`
    pub fn management_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.address, self.management_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_is_closed() {
        assert_eq!("Southbound".parse::<ServiceType>().unwrap(), ServiceType::Southbound);
        assert!(matches!(
            "Bogus".parse::<ServiceType>(),
            Err(EdgeError::InvalidServiceType(_))
        ));
        // 大小写敏感
        assert!("storage".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port(8081, "port").unwrap(), 8081);
        assert!(matches!(parse_port(0, "port"), Err(EdgeError::InvalidPort(_))));
        assert!(parse_port(-1, "port").is_err());
        assert!(parse_port(70000, "port").is_err());
    }

    #[test]
    fn test_filter_and_semantics() {
        let record = ServiceRecord {
            id: Uuid::new_v4(),
            name: "sine".to_string(),
            service_type: ServiceType::Southbound,
            protocol: "http".to_string(),
            address: "127.0.0.1".to_string(),
            service_port: None,
            management_port: 40001,
            status: ServiceStatus::Running,
            registered_at: Utc::now(),
        };

        assert!(ServiceFilter::default().matches(&record));
        assert!(ServiceFilter::by_name("sine").matches(&record));
        let mismatch = ServiceFilter {
            name: Some("sine".to_string()),
            service_type: Some(ServiceType::Storage),
            ..Default::default()
        };
        assert!(!mismatch.matches(&record));
        assert_eq!(record.management_url(), "http://127.0.0.1:40001");
    }
}
