use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edge_core::models::ChangeNotification;
use edge_core::traits::{CategoryReader, ConfigChangeListener, ServiceTransport};
use edge_core::{EdgeError, EdgeResult};
use edge_infrastructure::{InterestRegistry, ServiceRegistry};

/// 单个订阅方的投递结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    Failed(String),
    /// 订阅方已不在服务注册表中
    Unregistered,
}

impl DeliveryStatus {
    fn label(&self) -> &'static str {
        match self {
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed(_) => "failed",
            DeliveryStatus::Unregistered => "unregistered",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub microservice_uuid: Uuid,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone)]
pub struct NotificationReport {
    pub category: String,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl NotificationReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == DeliveryStatus::Delivered)
            .count()
    }
}

/// 配置变更通知器
///
/// 分类变更时把分类的当前内容并发推送给每个订阅方的 `/change` 端点。
/// 每个投递各自带超时，单个订阅方失败不影响其他订阅方。
pub struct ChangeNotifier {
    interests: Arc<InterestRegistry>,
    services: Arc<ServiceRegistry>,
    categories: Arc<dyn CategoryReader>,
    transport: Arc<dyn ServiceTransport>,
    delivery_timeout: Duration,
}

impl ChangeNotifier {
    pub fn new(
        interests: Arc<InterestRegistry>,
        services: Arc<ServiceRegistry>,
        categories: Arc<dyn CategoryReader>,
        transport: Arc<dyn ServiceTransport>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            interests,
            services,
            categories,
            transport,
            delivery_timeout,
        }
    }

    pub async fn notify(&self, category_name: &str) -> EdgeResult<NotificationReport> {
        let subscribers = self.interests.subscribers_of(category_name).await;
        if subscribers.is_empty() {
            debug!("分类 {} 没有订阅方", category_name);
            return Ok(NotificationReport {
                category: category_name.to_string(),
                outcomes: Vec::new(),
            });
        }

        let category = self
            .categories
            .get_category(category_name)
            .await?
            .ok_or_else(|| EdgeError::CategoryNotFound {
                name: category_name.to_string(),
            })?;
        let notification = ChangeNotification {
            category: category.name,
            items: category.value,
        };

        let deliveries = subscribers
            .iter()
            .map(|interest| self.deliver(interest.microservice_uuid, &notification));
        let outcomes = join_all(deliveries).await;

        Ok(NotificationReport {
            category: category_name.to_string(),
            outcomes,
        })
    }

    async fn deliver(
        &self,
        microservice_uuid: Uuid,
        notification: &ChangeNotification,
    ) -> DeliveryOutcome {
        let status = match self.services.get_by_id(microservice_uuid).await {
            Err(_) => {
                warn!(
                    "订阅方 {} 不在服务注册表中，跳过分类 {} 的变更通知",
                    microservice_uuid, notification.category
                );
                DeliveryStatus::Unregistered
            }
            Ok(service) => {
                let delivery = self
                    .transport
                    .notify_change(&service, notification, self.delivery_timeout);
                match tokio::time::timeout(self.delivery_timeout, delivery).await {
                    Ok(Ok(())) => {
                        debug!("分类 {} 的变更已通知 {}", notification.category, service.name);
                        DeliveryStatus::Delivered
                    }
                    Ok(Err(e)) => {
                        warn!(
                            "通知 {} ({}) 分类 {} 的变更失败: {}",
                            service.name,
                            service.management_url(),
                            notification.category,
                            e
                        );
                        DeliveryStatus::Failed(e.to_string())
                    }
                    Err(_) => {
                        warn!(
                            "通知 {} 分类 {} 的变更超时 ({:?})",
                            service.name, notification.category, self.delivery_timeout
                        );
                        DeliveryStatus::Failed(format!("超时 {:?}", self.delivery_timeout))
                    }
                }
            }
        };

        counter!("edge_notifier_deliveries_total", "status" => status.label()).increment(1);
        DeliveryOutcome {
            microservice_uuid,
            status,
        }
    }
}

#[async_trait]
impl ConfigChangeListener for ChangeNotifier {
    async fn on_category_changed(&self, category_name: &str) {
        match self.notify(category_name).await {
            Ok(report) if !report.outcomes.is_empty() => {
                info!(
                    "分类 {} 变更通知完成: {}/{} 个订阅方成功",
                    category_name,
                    report.delivered(),
                    report.outcomes.len()
                );
            }
            Ok(_) => {}
            Err(e) => error!("分类 {} 变更通知失败: {}", category_name, e),
        }
    }
}
