pub mod memory;
pub mod sqlite;

pub use memory::{
    InMemoryCategoryRepository, InMemoryProcessRepository, InMemoryScheduleRepository,
    InMemoryTaskRepository,
};
pub use sqlite::{
    SqliteCategoryRepository, SqliteProcessRepository, SqliteScheduleRepository,
    SqliteTaskRepository,
};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use edge_core::config::DatabaseConfig;
use edge_core::EdgeResult;

/// SQLite 连接池与表结构
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> EdgeResult<Self> {
        let in_memory = config.url.contains(":memory:");

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存库的每个连接都是独立的数据库，只能使用单连接
        let max_connections = if in_memory { 1 } else { config.max_connections };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        info!("已连接数据库: {}", config.url);
        let manager = Self { pool };
        manager.migrate().await?;
        Ok(manager)
    }

    /// 内存数据库，测试使用
    pub async fn in_memory() -> EdgeResult<Self> {
        Self::new(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 建表，可重复执行
    pub async fn migrate(&self) -> EdgeResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_processes (
                name TEXT PRIMARY KEY,
                script TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedules (
                schedule_id BLOB PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                process_name TEXT NOT NULL,
                schedule_type TEXT NOT NULL,
                repeat_ms INTEGER NOT NULL DEFAULT 0,
                time_of_day TEXT,
                day_of_week INTEGER,
                enabled BOOLEAN NOT NULL DEFAULT 1,
                exclusive BOOLEAN NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                task_id BLOB PRIMARY KEY,
                process_name TEXT NOT NULL,
                schedule_id BLOB,
                schedule_name TEXT,
                state TEXT NOT NULL DEFAULT 'RUNNING',
                start_time DATETIME NOT NULL,
                end_time DATETIME,
                exit_code INTEGER,
                cancel_requested DATETIME,
                reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS configuration (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                value TEXT NOT NULL DEFAULT '{}',
                display_name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_schedule_id ON tasks(schedule_id)",
            "CREATE INDEX IF NOT EXISTS idx_tasks_start_time ON tasks(start_time)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql).execute(&self.pool).await?;
        }

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    pub async fn health_check(&self) -> EdgeResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
