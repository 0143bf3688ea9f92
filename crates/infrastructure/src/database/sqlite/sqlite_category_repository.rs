use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::instrument;

use edge_core::models::ConfigCategory;
use edge_core::traits::CategoryRepository;
use edge_core::{EdgeError, EdgeResult};

pub struct SqliteCategoryRepository {
    pool: SqlitePool,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_category(row: &SqliteRow) -> EdgeResult<ConfigCategory> {
        let value: String = row.try_get("value")?;
        Ok(ConfigCategory {
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            value: serde_json::from_str(&value)?,
            display_name: row.try_get("display_name")?,
        })
    }
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    #[instrument(skip(self), fields(category = %name))]
    async fn get(&self, name: &str) -> EdgeResult<Option<ConfigCategory>> {
        let row = sqlx::query(
            "SELECT name, description, value, display_name FROM configuration WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_category).transpose()
    }

    #[instrument(skip(self, category), fields(category = %category.name))]
    async fn save(&self, category: &ConfigCategory) -> EdgeResult<()> {
        let value = serde_json::to_string(&category.value)?;
        sqlx::query(
            r#"
            INSERT INTO configuration (name, description, value, display_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(name) DO UPDATE SET
                description = excluded.description,
                value = excluded.value,
                display_name = excluded.display_name
            "#,
        )
        .bind(&category.name)
        .bind(&category.description)
        .bind(value)
        .bind(&category.display_name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_names(&self) -> EdgeResult<Vec<String>> {
        let rows = sqlx::query("SELECT name FROM configuration ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(EdgeError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_get_and_names() {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteCategoryRepository::new(db.pool().clone());

        let value = match json!({"port": {"type": "integer", "default": "6683", "value": "6683"}}) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let category = ConfigCategory::new("HTTP_SOUTH", "HTTP South", value, Some("HTTP"));
        repo.save(&category).await.unwrap();
        repo.save(&ConfigCategory::new("COAP", "CoAP", Default::default(), None))
            .await
            .unwrap();

        assert_eq!(repo.get("HTTP_SOUTH").await.unwrap(), Some(category));
        assert!(repo.get("MISSING").await.unwrap().is_none());
        assert_eq!(repo.list_names().await.unwrap(), vec!["COAP", "HTTP_SOUTH"]);
    }
}
