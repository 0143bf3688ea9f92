use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 微服务对某个配置分类的订阅
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRecord {
    pub registration_id: Uuid,
    /// 指向 ServiceRecord.id，通知时再解析，不做长期缓存
    pub microservice_uuid: Uuid,
    pub category_name: String,
}

impl InterestRecord {
    pub fn new(microservice_uuid: Uuid, category_name: &str) -> Self {
        Self {
            registration_id: Uuid::new_v4(),
            microservice_uuid,
            category_name: category_name.to_string(),
        }
    }
}

/// 兴趣查询过滤器，多个条件之间为 AND 关系
#[derive(Debug, Clone, Default)]
pub struct InterestFilter {
    pub registration_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub microservice_uuid: Option<Uuid>,
}

impl InterestFilter {
    pub fn by_category(category_name: &str) -> Self {
        Self {
            category_name: Some(category_name.to_string()),
            ..Default::default()
        }
    }

    pub fn by_microservice(microservice_uuid: Uuid) -> Self {
        Self {
            microservice_uuid: Some(microservice_uuid),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &InterestRecord) -> bool {
        self.registration_id
            .map_or(true, |id| record.registration_id == id)
            && self
                .category_name
                .as_ref()
                .map_or(true, |name| &record.category_name == name)
            && self
                .microservice_uuid
                .map_or(true, |uuid| record.microservice_uuid == uuid)
    }
}
