use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use edge_core::models::{Task, TaskFilter, TaskState};
use edge_core::traits::TaskRepository;
use edge_core::{EdgeError, EdgeResult};

const TASK_COLUMNS: &str = "task_id, process_name, schedule_id, schedule_name, state, start_time, end_time, exit_code, cancel_requested, reason";

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &SqliteRow) -> EdgeResult<Task> {
        Ok(Task {
            task_id: row.try_get("task_id")?,
            process_name: row.try_get("process_name")?,
            schedule_id: row.try_get("schedule_id")?,
            schedule_name: row.try_get("schedule_name")?,
            state: row.try_get("state")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            exit_code: row.try_get("exit_code")?,
            cancel_requested: row.try_get("cancel_requested")?,
            reason: row.try_get("reason")?,
        })
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task), fields(task_id = %task.task_id, process_name = %task.process_name))]
    async fn insert(&self, task: &Task) -> EdgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (task_id, process_name, schedule_id, schedule_name, state, start_time, end_time, exit_code, cancel_requested, reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(task.task_id)
        .bind(&task.process_name)
        .bind(task.schedule_id)
        .bind(&task.schedule_name)
        .bind(task.state)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(task.exit_code)
        .bind(task.cancel_requested)
        .bind(&task.reason)
        .execute(&self.pool)
        .await?;

        debug!("已插入任务: {} ({})", task.task_id, task.process_name);
        Ok(())
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id, state = %task.state))]
    async fn update(&self, task: &Task) -> EdgeResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET state = $2, end_time = $3, exit_code = $4, cancel_requested = $5, reason = $6
            WHERE task_id = $1
            "#,
        )
        .bind(task.task_id)
        .bind(task.state)
        .bind(task.end_time)
        .bind(task.exit_code)
        .bind(task.cancel_requested)
        .bind(&task.reason)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EdgeError::TaskNotFound { id: task.task_id });
        }
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[instrument(skip(self, filter), fields(
        state = ?filter.state,
        schedule_id = ?filter.schedule_id,
        limit = ?filter.limit,
    ))]
    async fn list(&self, filter: &TaskFilter) -> EdgeResult<Vec<Task>> {
        let mut query = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE 1=1");
        let mut param_count = 0;

        if filter.state.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND state = ${param_count}"));
        }
        if filter.schedule_id.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND schedule_id = ${param_count}"));
        }
        if filter.process_name.is_some() {
            param_count += 1;
            query.push_str(&format!(" AND process_name = ${param_count}"));
        }

        query.push_str(" ORDER BY start_time DESC");

        if filter.limit.is_some() {
            param_count += 1;
            query.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(state) = filter.state {
            sqlx_query = sqlx_query.bind(state);
        }
        if let Some(schedule_id) = filter.schedule_id {
            sqlx_query = sqlx_query.bind(schedule_id);
        }
        if let Some(process_name) = &filter.process_name {
            sqlx_query = sqlx_query.bind(process_name);
        }
        if let Some(limit) = filter.limit {
            sqlx_query = sqlx_query.bind(limit);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(Self::row_to_task).collect()
    }

    async fn get_running(&self) -> EdgeResult<Vec<Task>> {
        self.list(&TaskFilter {
            state: Some(TaskState::Running),
            ..Default::default()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> EdgeResult<u64> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE state != $1 AND end_time IS NOT NULL AND end_time < $2",
        )
        .bind(TaskState::Running)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
