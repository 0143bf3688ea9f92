use chrono::Utc;
use metrics::gauge;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use edge_core::models::{
    parse_port, ServiceFilter, ServiceRecord, ServiceRegistration, ServiceStatus, ServiceType,
};
use edge_core::{EdgeError, EdgeResult};

/// 服务注册表
///
/// 当前存活微服务的权威内存目录，进程重启后由各服务重新注册重建。
/// 记录按注册顺序保存，健康监控按此顺序逐个探测。
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: RwLock<Vec<ServiceRecord>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册服务，返回新分配的服务ID
    pub async fn register(&self, registration: ServiceRegistration) -> EdgeResult<Uuid> {
        let service_type: ServiceType = registration.service_type.parse()?;
        let management_port = parse_port(registration.management_port, "management_port")?;
        let service_port = registration
            .service_port
            .map(|port| parse_port(port, "service_port"))
            .transpose()?;

        let mut services = self.services.write().await;
        if services
            .iter()
            .any(|s| s.address == registration.address && s.management_port == management_port)
        {
            return Err(EdgeError::AlreadyExistsWithTheSameAddressAndPort {
                address: registration.address,
                port: management_port,
            });
        }

        let record = ServiceRecord {
            id: Uuid::new_v4(),
            name: registration.name,
            service_type,
            protocol: registration.protocol,
            address: registration.address,
            service_port,
            management_port,
            status: ServiceStatus::Running,
            registered_at: Utc::now(),
        };
        let id = record.id;

        info!(
            "注册服务: {} (类型: {}, 地址: {}:{}, ID: {})",
            record.name, record.service_type, record.address, record.management_port, id
        );
        services.push(record);
        gauge!("edge_registered_services").set(services.len() as f64);

        Ok(id)
    }

    /// 注销服务，返回被移除的记录
    pub async fn unregister(&self, id: Uuid) -> EdgeResult<ServiceRecord> {
        let mut services = self.services.write().await;
        let position = services
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| EdgeError::DoesNotExist(format!("服务 {id}")))?;

        let removed = services.remove(position);
        gauge!("edge_registered_services").set(services.len() as f64);
        info!("注销服务: {} (ID: {})", removed.name, removed.id);

        Ok(removed)
    }

    /// 按过滤条件查询，结果为空时返回 `DoesNotExist`
    pub async fn get(&self, filter: &ServiceFilter) -> EdgeResult<Vec<ServiceRecord>> {
        let services = self.services.read().await;
        let matched: Vec<ServiceRecord> = services
            .iter()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!("未找到匹配的服务: {:?}", filter);
            return Err(EdgeError::DoesNotExist(format!("服务 {filter:?}")));
        }
        Ok(matched)
    }

    pub async fn get_by_id(&self, id: Uuid) -> EdgeResult<ServiceRecord> {
        self.get(&ServiceFilter::by_id(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EdgeError::DoesNotExist(format!("服务 {id}")))
    }

    /// 全部记录，按注册顺序
    pub async fn all(&self) -> Vec<ServiceRecord> {
        self.services.read().await.clone()
    }

    pub async fn mark_status(&self, id: Uuid, status: ServiceStatus) -> EdgeResult<()> {
        let mut services = self.services.write().await;
        let record = services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| EdgeError::DoesNotExist(format!("服务 {id}")))?;

        if record.status != status {
            debug!("服务 {} 状态变更: {:?} -> {:?}", record.name, record.status, status);
            record.status = status;
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }
}
