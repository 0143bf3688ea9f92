use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, instrument};
use uuid::Uuid;

use edge_core::models::Schedule;
use edge_core::traits::ScheduleRepository;
use edge_core::{EdgeError, EdgeResult};

const SCHEDULE_COLUMNS: &str =
    "schedule_id, name, process_name, schedule_type, repeat_ms, time_of_day, day_of_week, enabled, exclusive";

pub struct SqliteScheduleRepository {
    pool: SqlitePool,
}

impl SqliteScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(row: &SqliteRow) -> EdgeResult<Schedule> {
        let repeat_ms: i64 = row.try_get("repeat_ms")?;
        let time_of_day: Option<NaiveTime> = row.try_get("time_of_day")?;
        let day_of_week: Option<i64> = row.try_get("day_of_week")?;
        let day_of_week = day_of_week
            .map(|day| {
                u8::try_from(day)
                    .map_err(|_| EdgeError::Internal(format!("非法的 day_of_week: {day}")))
            })
            .transpose()?;

        Ok(Schedule {
            schedule_id: row.try_get("schedule_id")?,
            name: row.try_get("name")?,
            process_name: row.try_get("process_name")?,
            schedule_type: row.try_get("schedule_type")?,
            repeat: Duration::from_millis(repeat_ms.max(0) as u64),
            time_of_day,
            day_of_week,
            enabled: row.try_get("enabled")?,
            exclusive: row.try_get("exclusive")?,
        })
    }
}

#[async_trait]
impl ScheduleRepository for SqliteScheduleRepository {
    #[instrument(skip(self))]
    async fn get_all(&self) -> EdgeResult<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_schedule).collect()
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE schedule_id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self), fields(schedule_name = %name))]
    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "SELECT {SCHEDULE_COLUMNS} FROM schedules WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_schedule).transpose()
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.schedule_id, schedule_name = %schedule.name))]
    async fn insert(&self, schedule: &Schedule) -> EdgeResult<()> {
        sqlx::query(
            r#"
            INSERT INTO schedules (schedule_id, name, process_name, schedule_type, repeat_ms, time_of_day, day_of_week, enabled, exclusive)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(schedule.schedule_id)
        .bind(&schedule.name)
        .bind(&schedule.process_name)
        .bind(schedule.schedule_type)
        .bind(schedule.repeat.as_millis() as i64)
        .bind(schedule.time_of_day)
        .bind(schedule.day_of_week.map(i64::from))
        .bind(schedule.enabled)
        .bind(schedule.exclusive)
        .execute(&self.pool)
        .await?;

        debug!("已插入调度计划: {}", schedule.name);
        Ok(())
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.schedule_id, schedule_name = %schedule.name))]
    async fn update(&self, schedule: &Schedule) -> EdgeResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE schedules
            SET name = $2, process_name = $3, schedule_type = $4, repeat_ms = $5,
                time_of_day = $6, day_of_week = $7, enabled = $8, exclusive = $9
            WHERE schedule_id = $1
            "#,
        )
        .bind(schedule.schedule_id)
        .bind(&schedule.name)
        .bind(&schedule.process_name)
        .bind(schedule.schedule_type)
        .bind(schedule.repeat.as_millis() as i64)
        .bind(schedule.time_of_day)
        .bind(schedule.day_of_week.map(i64::from))
        .bind(schedule.enabled)
        .bind(schedule.exclusive)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EdgeError::ScheduleNotFound {
                id: schedule.schedule_id,
            });
        }
        debug!("已更新调度计划: {}", schedule.name);
        Ok(())
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn delete(&self, id: Uuid) -> EdgeResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE schedule_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(EdgeError::ScheduleNotFound { id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseManager;

    async fn repository() -> (DatabaseManager, SqliteScheduleRepository) {
        let db = DatabaseManager::in_memory().await.unwrap();
        let repo = SqliteScheduleRepository::new(db.pool().clone());
        (db, repo)
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (_db, repo) = repository().await;
        let schedule = Schedule::timed(
            "purge",
            "purge",
            NaiveTime::from_hms_opt(3, 30, 0).unwrap(),
            Some(7),
        )
        .with_id(Uuid::new_v4())
        .with_exclusive(false);

        repo.insert(&schedule).await.unwrap();

        let loaded = repo.get_by_id(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(loaded, schedule);
        let by_name = repo.get_by_name("purge").await.unwrap().unwrap();
        assert_eq!(by_name.schedule_id, schedule.schedule_id);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (_db, repo) = repository().await;
        let mut schedule =
            Schedule::interval("stats", "stats collector", Duration::from_secs(15))
                .with_id(Uuid::new_v4());
        repo.insert(&schedule).await.unwrap();

        schedule.repeat = Duration::from_secs(30);
        schedule.enabled = false;
        repo.update(&schedule).await.unwrap();
        let loaded = repo.get_by_id(schedule.schedule_id).await.unwrap().unwrap();
        assert_eq!(loaded.repeat, Duration::from_secs(30));
        assert!(!loaded.enabled);

        repo.delete(schedule.schedule_id).await.unwrap();
        assert!(repo.get_by_id(schedule.schedule_id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(schedule.schedule_id).await,
            Err(EdgeError::ScheduleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_all_ordered_by_name() {
        let (_db, repo) = repository().await;
        repo.insert(&Schedule::manual("zeta", "p").with_id(Uuid::new_v4()))
            .await
            .unwrap();
        repo.insert(&Schedule::startup("alpha", "p").with_id(Uuid::new_v4()))
            .await
            .unwrap();

        let names: Vec<String> = repo
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
