use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::instrument;

use edge_core::models::ScheduledProcess;
use edge_core::traits::ProcessRepository;
use edge_core::EdgeResult;

pub struct SqliteProcessRepository {
    pool: SqlitePool,
}

impl SqliteProcessRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_process(row: &SqliteRow) -> EdgeResult<ScheduledProcess> {
        let script: String = row.try_get("script")?;
        Ok(ScheduledProcess {
            name: row.try_get("name")?,
            script: serde_json::from_str(&script)?,
        })
    }
}

#[async_trait]
impl ProcessRepository for SqliteProcessRepository {
    #[instrument(skip(self))]
    async fn get_all(&self) -> EdgeResult<Vec<ScheduledProcess>> {
        let rows = sqlx::query("SELECT name, script FROM scheduled_processes ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_process).collect()
    }

    #[instrument(skip(self), fields(process_name = %name))]
    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<ScheduledProcess>> {
        let row = sqlx::query("SELECT name, script FROM scheduled_processes WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_process).transpose()
    }

    #[instrument(skip(self, process), fields(process_name = %process.name))]
    async fn save(&self, process: &ScheduledProcess) -> EdgeResult<()> {
        let script = serde_json::to_string(&process.script)?;
        sqlx::query(
            r#"
            INSERT INTO scheduled_processes (name, script) VALUES ($1, $2)
            ON CONFLICT(name) DO UPDATE SET script = excluded.script
            "#,
        )
        .bind(&process.name)
        .bind(script)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
