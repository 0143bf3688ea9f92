use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 配置分类的取值：配置项名称 → 配置项定义
///
/// 配置项定义是一个 JSON 对象，约定包含 `description`、`type`、`default`
/// 以及当前生效的 `value`。
pub type CategoryValue = Map<String, Value>;

/// 配置分类
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigCategory {
    pub name: String,
    pub description: String,
    pub value: CategoryValue,
    pub display_name: String,
}

impl ConfigCategory {
    pub fn new(name: &str, description: &str, value: CategoryValue, display_name: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            value,
            display_name: display_name.unwrap_or(name).to_string(),
        }
    }

    /// 读取某个配置项的当前值
    pub fn item_value(&self, item_name: &str) -> Option<&Value> {
        self.value.get(item_name).and_then(|item| item.get("value"))
    }
}

/// 为默认定义中的每个配置项补齐 `value` 字段
///
/// 已存储的分类中存在同名配置项时保留其 `value`，否则使用 `default`。
/// `keep_original_items` 为 true 时，仅存在于已存储分类中的配置项也会保留。
pub fn merge_category_value(
    default_value: &CategoryValue,
    stored_value: Option<&CategoryValue>,
    keep_original_items: bool,
) -> CategoryValue {
    let mut merged = Map::new();

    for (item_name, definition) in default_value {
        let mut item = definition.clone();
        let stored_item_value = stored_value
            .and_then(|stored| stored.get(item_name))
            .and_then(|stored_item| stored_item.get("value"))
            .cloned();

        if let Value::Object(fields) = &mut item {
            let value = stored_item_value
                .or_else(|| fields.get("default").cloned())
                .unwrap_or(Value::Null);
            fields.insert("value".to_string(), value);
        }
        merged.insert(item_name.clone(), item);
    }

    if keep_original_items {
        if let Some(stored) = stored_value {
            for (item_name, item) in stored {
                merged
                    .entry(item_name.clone())
                    .or_insert_with(|| item.clone());
            }
        }
    }

    merged
}

/// 发往订阅方 `/change` 端点的变更通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub category: String,
    pub items: CategoryValue,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> CategoryValue {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_merge_uses_default_when_nothing_stored() {
        let default = as_map(json!({
            "port": {"description": "Listen port", "type": "integer", "default": "6683"}
        }));

        let merged = merge_category_value(&default, None, false);
        assert_eq!(merged["port"]["value"], json!("6683"));
    }

    #[test]
    fn test_merge_keeps_stored_value() {
        let default = as_map(json!({
            "port": {"description": "Listen port", "type": "integer", "default": "6683"},
            "host": {"description": "Host", "type": "string", "default": "localhost"}
        }));
        let stored = as_map(json!({
            "port": {"description": "Listen port", "type": "integer", "default": "6683", "value": "7000"},
            "legacy": {"description": "Old", "type": "string", "default": "x", "value": "y"}
        }));

        let merged = merge_category_value(&default, Some(&stored), false);
        assert_eq!(merged["port"]["value"], json!("7000"));
        assert_eq!(merged["host"]["value"], json!("localhost"));
        assert!(!merged.contains_key("legacy"));

        let kept = merge_category_value(&default, Some(&stored), true);
        assert_eq!(kept["legacy"]["value"], json!("y"));
    }

    #[test]
    fn test_item_value() {
        let category = ConfigCategory::new(
            "SCHEDULER",
            "Scheduler configuration",
            as_map(json!({"max_running_tasks": {"type": "integer", "default": "20", "value": "10"}})),
            None,
        );
        assert_eq!(category.display_name, "SCHEDULER");
        assert_eq!(category.item_value("max_running_tasks"), Some(&json!("10")));
        assert_eq!(category.item_value("missing"), None);
    }
}
