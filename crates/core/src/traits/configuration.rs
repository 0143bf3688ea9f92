use async_trait::async_trait;

use crate::models::ConfigCategory;
use crate::EdgeResult;

/// 配置分类变更回调
///
/// 配置管理器在启动时注册一个监听器，分类取值变化且该分类存在触发器时调用。
#[async_trait]
pub trait ConfigChangeListener: Send + Sync {
    async fn on_category_changed(&self, category_name: &str);
}

/// 配置管理器维护的分类变更触发器
#[async_trait]
pub trait ChangeTriggers: Send + Sync {
    async fn register_trigger(&self, category_name: &str) -> EdgeResult<()>;

    async fn unregister_trigger(&self, category_name: &str) -> EdgeResult<()>;
}

/// 读取配置分类的完整当前值
#[async_trait]
pub trait CategoryReader: Send + Sync {
    async fn get_category(&self, category_name: &str) -> EdgeResult<Option<ConfigCategory>>;
}
