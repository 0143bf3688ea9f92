use std::collections::HashSet;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};

use edge_core::models::{merge_category_value, CategoryValue, ConfigCategory};
use edge_core::traits::{CategoryReader, CategoryRepository, ChangeTriggers, ConfigChangeListener};
use edge_core::{EdgeError, EdgeResult};

use super::ConfigurationCache;

/// 配置管理器
///
/// 读路径先查缓存再查仓储，写路径先写仓储再刷新缓存，写操作之间串行执行。
/// 分类取值发生变化且该分类注册了触发器时，回调 [`ConfigChangeListener`]。
pub struct ConfigurationManager {
    repository: Arc<dyn CategoryRepository>,
    cache: Arc<ConfigurationCache>,
    write_lock: Mutex<()>,
    triggers: RwLock<HashSet<String>>,
    listener: RwLock<Option<Weak<dyn ConfigChangeListener>>>,
}

impl ConfigurationManager {
    pub fn new(repository: Arc<dyn CategoryRepository>, cache: Arc<ConfigurationCache>) -> Self {
        Self {
            repository,
            cache,
            write_lock: Mutex::new(()),
            triggers: RwLock::new(HashSet::new()),
            listener: RwLock::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<ConfigurationCache> {
        &self.cache
    }

    /// 注册变更监听器
    ///
    /// 只保存弱引用，监听器通常反向持有本管理器。
    pub async fn set_change_listener(&self, listener: Arc<dyn ConfigChangeListener>) {
        *self.listener.write().await = Some(Arc::downgrade(&listener));
    }

    pub async fn has_trigger(&self, category_name: &str) -> bool {
        self.triggers.read().await.contains(category_name)
    }

    #[instrument(skip(self))]
    pub async fn get_category_names(&self) -> EdgeResult<Vec<String>> {
        self.repository.list_names().await
    }

    /// 创建分类，已存在时合并已存储的配置项取值
    #[instrument(skip(self, default_value))]
    pub async fn create_category(
        &self,
        category_name: &str,
        description: &str,
        default_value: &CategoryValue,
        keep_original_items: bool,
        display_name: Option<&str>,
    ) -> EdgeResult<ConfigCategory> {
        let write_guard = self.write_lock.lock().await;
        let stored = self.repository.get(category_name).await?;
        let merged = merge_category_value(
            default_value,
            stored.as_ref().map(|c| &c.value),
            keep_original_items,
        );

        let category = ConfigCategory::new(category_name, description, merged, display_name);
        let changed = match &stored {
            Some(existing) => existing.value != category.value,
            None => true,
        };

        if stored.as_ref() != Some(&category) {
            self.repository.save(&category).await?;
            info!("保存配置分类: {}", category_name);
        }
        self.cache.update(
            category_name,
            &category.description,
            category.value.clone(),
            Some(&category.display_name),
        );
        drop(write_guard);

        if changed && stored.is_some() {
            self.fire_change(category_name).await;
        }
        Ok(category)
    }

    /// 更新单个配置项的取值
    #[instrument(skip(self, new_value))]
    pub async fn set_category_item_value(
        &self,
        category_name: &str,
        item_name: &str,
        new_value: &str,
    ) -> EdgeResult<()> {
        let write_guard = self.write_lock.lock().await;
        let mut category = self
            .get_category(category_name)
            .await?
            .ok_or_else(|| EdgeError::CategoryNotFound {
                name: category_name.to_string(),
            })?;

        let item = category
            .value
            .get_mut(item_name)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| {
                EdgeError::DoesNotExist(format!("配置项 {category_name}.{item_name}"))
            })?;

        if item.get("value").and_then(Value::as_str) == Some(new_value) {
            debug!("配置项 {}.{} 取值未变化", category_name, item_name);
            return Ok(());
        }
        item.insert("value".to_string(), Value::String(new_value.to_string()));

        self.repository.save(&category).await?;
        self.cache.update(
            category_name,
            &category.description,
            category.value,
            Some(&category.display_name),
        );
        info!("配置项已更新: {}.{} = {}", category_name, item_name, new_value);
        drop(write_guard);

        self.fire_change(category_name).await;
        Ok(())
    }

    async fn fire_change(&self, category_name: &str) {
        if !self.has_trigger(category_name).await {
            return;
        }
        let listener = self.listener.read().await.as_ref().and_then(Weak::upgrade);
        match listener {
            Some(listener) => listener.on_category_changed(category_name).await,
            None => debug!("分类 {} 存在触发器但未注册监听器", category_name),
        }
    }
}

#[async_trait]
impl CategoryReader for ConfigurationManager {
    async fn get_category(&self, category_name: &str) -> EdgeResult<Option<ConfigCategory>> {
        if let Some(category) = self.cache.get(category_name) {
            return Ok(Some(category));
        }

        let stored = self.repository.get(category_name).await?;
        if let Some(category) = &stored {
            self.cache.update(
                &category.name,
                &category.description,
                category.value.clone(),
                Some(&category.display_name),
            );
        }
        Ok(stored)
    }
}

#[async_trait]
impl ChangeTriggers for ConfigurationManager {
    async fn register_trigger(&self, category_name: &str) -> EdgeResult<()> {
        if self.triggers.write().await.insert(category_name.to_string()) {
            debug!("注册分类变更触发器: {}", category_name);
        }
        Ok(())
    }

    async fn unregister_trigger(&self, category_name: &str) -> EdgeResult<()> {
        if self.triggers.write().await.remove(category_name) {
            debug!("移除分类变更触发器: {}", category_name);
        }
        Ok(())
    }
}
