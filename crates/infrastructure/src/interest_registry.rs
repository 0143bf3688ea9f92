use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use edge_core::models::{InterestFilter, InterestRecord};
use edge_core::traits::ChangeTriggers;
use edge_core::{EdgeError, EdgeResult};

/// 兴趣注册表
///
/// 记录微服务对配置分类的订阅，并维护配置侧的分类变更触发器：
/// 分类的第一个订阅出现时注册触发器，最后一个订阅移除时撤销。
pub struct InterestRegistry {
    interests: RwLock<Vec<InterestRecord>>,
    triggers: Arc<dyn ChangeTriggers>,
}

impl InterestRegistry {
    pub fn new(triggers: Arc<dyn ChangeTriggers>) -> Self {
        Self {
            interests: RwLock::new(Vec::new()),
            triggers,
        }
    }

    /// 登记订阅，返回登记ID
    pub async fn register_interest(
        &self,
        microservice_uuid: Uuid,
        category_name: &str,
    ) -> EdgeResult<Uuid> {
        let mut interests = self.interests.write().await;
        if interests
            .iter()
            .any(|i| i.microservice_uuid == microservice_uuid && i.category_name == category_name)
        {
            return Err(EdgeError::InterestRegistrationAlreadyExists {
                microservice_uuid,
                category_name: category_name.to_string(),
            });
        }

        let first_for_category = !interests.iter().any(|i| i.category_name == category_name);
        if first_for_category {
            self.triggers.register_trigger(category_name).await?;
        }

        let record = InterestRecord::new(microservice_uuid, category_name);
        let registration_id = record.registration_id;
        interests.push(record);

        info!(
            "服务 {} 订阅配置分类 {} (登记ID: {})",
            microservice_uuid, category_name, registration_id
        );
        Ok(registration_id)
    }

    /// 撤销订阅
    ///
    /// 撤销分类触发器失败时订阅保持不变。
    pub async fn unregister_interest(&self, registration_id: Uuid) -> EdgeResult<InterestRecord> {
        let mut interests = self.interests.write().await;
        let position = interests
            .iter()
            .position(|i| i.registration_id == registration_id)
            .ok_or_else(|| EdgeError::DoesNotExist(format!("订阅 {registration_id}")))?;

        let category_name = &interests[position].category_name;
        let last_for_category = interests
            .iter()
            .filter(|i| &i.category_name == category_name)
            .count()
            == 1;
        if last_for_category {
            self.triggers.unregister_trigger(category_name).await?;
        }

        let removed = interests.remove(position);

        info!(
            "撤销订阅: 服务 {} / 分类 {}",
            removed.microservice_uuid, removed.category_name
        );
        Ok(removed)
    }

    /// 按过滤条件查询，结果为空时返回 `DoesNotExist`
    pub async fn get(&self, filter: &InterestFilter) -> EdgeResult<Vec<InterestRecord>> {
        let matched: Vec<InterestRecord> = self
            .interests
            .read()
            .await
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();

        if matched.is_empty() {
            debug!("未找到匹配的订阅: {:?}", filter);
            return Err(EdgeError::DoesNotExist(format!("订阅 {filter:?}")));
        }
        Ok(matched)
    }

    /// 某分类的全部订阅，没有时返回空列表
    pub async fn subscribers_of(&self, category_name: &str) -> Vec<InterestRecord> {
        self.get(&InterestFilter::by_category(category_name))
            .await
            .unwrap_or_default()
    }

    pub async fn len(&self) -> usize {
        self.interests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.interests.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeTriggers {
        active: Mutex<HashSet<String>>,
        fail_unregister: Mutex<bool>,
    }

    #[async_trait]
    impl ChangeTriggers for FakeTriggers {
        async fn register_trigger(&self, category_name: &str) -> EdgeResult<()> {
            self.active.lock().unwrap().insert(category_name.to_string());
            Ok(())
        }

        async fn unregister_trigger(&self, category_name: &str) -> EdgeResult<()> {
            if *self.fail_unregister.lock().unwrap() {
                return Err(EdgeError::Internal("触发器撤销失败".to_string()));
            }
            self.active.lock().unwrap().remove(category_name);
            Ok(())
        }
    }

    fn registry() -> (InterestRegistry, Arc<FakeTriggers>) {
        let triggers = Arc::new(FakeTriggers::default());
        (InterestRegistry::new(triggers.clone()), triggers)
    }

    #[tokio::test]
    async fn test_duplicate_interest_fails() {
        let (registry, _) = registry();
        let service = Uuid::new_v4();
        registry.register_interest(service, "COAP").await.unwrap();

        let err = registry.register_interest(service, "COAP").await.unwrap_err();
        assert!(matches!(
            err,
            EdgeError::InterestRegistrationAlreadyExists { .. }
        ));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_triggers_follow_interest_lifecycle() {
        let (registry, triggers) = registry();
        let first = registry
            .register_interest(Uuid::new_v4(), "COAP")
            .await
            .unwrap();
        let second = registry
            .register_interest(Uuid::new_v4(), "COAP")
            .await
            .unwrap();
        assert!(triggers.active.lock().unwrap().contains("COAP"));

        registry.unregister_interest(first).await.unwrap();
        assert!(triggers.active.lock().unwrap().contains("COAP"));

        registry.unregister_interest(second).await.unwrap();
        assert!(!triggers.active.lock().unwrap().contains("COAP"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_trigger_removal_keeps_interest() {
        let (registry, triggers) = registry();
        let registration = registry
            .register_interest(Uuid::new_v4(), "COAP")
            .await
            .unwrap();

        *triggers.fail_unregister.lock().unwrap() = true;
        assert!(matches!(
            registry.unregister_interest(registration).await,
            Err(EdgeError::Internal(_))
        ));
        assert_eq!(registry.subscribers_of("COAP").await.len(), 1);
        assert!(triggers.active.lock().unwrap().contains("COAP"));

        *triggers.fail_unregister.lock().unwrap() = false;
        registry.unregister_interest(registration).await.unwrap();
        assert!(registry.is_empty().await);
        assert!(!triggers.active.lock().unwrap().contains("COAP"));
    }

    #[tokio::test]
    async fn test_unregister_unknown_fails() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.unregister_interest(Uuid::new_v4()).await,
            Err(EdgeError::DoesNotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_get_with_filters() {
        let (registry, _) = registry();
        let service = Uuid::new_v4();
        registry.register_interest(service, "COAP").await.unwrap();
        registry.register_interest(service, "HTTP").await.unwrap();
        registry
            .register_interest(Uuid::new_v4(), "HTTP")
            .await
            .unwrap();

        assert_eq!(
            registry
                .get(&InterestFilter::by_microservice(service))
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(registry.subscribers_of("HTTP").await.len(), 2);
        assert!(registry.subscribers_of("MQTT").await.is_empty());
        assert!(registry
            .get(&InterestFilter::by_category("MQTT"))
            .await
            .is_err());
    }
}
