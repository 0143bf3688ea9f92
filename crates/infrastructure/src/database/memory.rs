//! 内存仓储实现
//!
//! 与 SQLite 实现语义一致，用于测试以及不需要持久化的场景。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use edge_core::models::{ConfigCategory, Schedule, ScheduledProcess, Task, TaskFilter, TaskState};
use edge_core::traits::{
    CategoryRepository, ProcessRepository, ScheduleRepository, TaskRepository,
};
use edge_core::{EdgeError, EdgeResult};

#[derive(Debug, Clone, Default)]
pub struct InMemoryScheduleRepository {
    schedules: Arc<Mutex<HashMap<Uuid, Schedule>>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.schedules.lock().await.len()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn get_all(&self) -> EdgeResult<Vec<Schedule>> {
        let mut schedules: Vec<Schedule> = self.schedules.lock().await.values().cloned().collect();
        schedules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(schedules)
    }

    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Schedule>> {
        Ok(self.schedules.lock().await.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<Schedule>> {
        Ok(self
            .schedules
            .lock()
            .await
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn insert(&self, schedule: &Schedule) -> EdgeResult<()> {
        let mut schedules = self.schedules.lock().await;
        if schedules.values().any(|s| s.name == schedule.name) {
            return Err(EdgeError::DuplicateRequest(format!(
                "调度计划名称已存在: {}",
                schedule.name
            )));
        }
        schedules.insert(schedule.schedule_id, schedule.clone());
        Ok(())
    }

    async fn update(&self, schedule: &Schedule) -> EdgeResult<()> {
        let mut schedules = self.schedules.lock().await;
        match schedules.get_mut(&schedule.schedule_id) {
            Some(existing) => {
                *existing = schedule.clone();
                Ok(())
            }
            None => Err(EdgeError::ScheduleNotFound {
                id: schedule.schedule_id,
            }),
        }
    }

    async fn delete(&self, id: Uuid) -> EdgeResult<()> {
        self.schedules
            .lock()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(EdgeError::ScheduleNotFound { id })
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置任务，用于模拟重启前遗留的记录
    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.task_id, t)).collect();
        Self {
            tasks: Arc::new(Mutex::new(map)),
        }
    }

    pub async fn count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert(&self, task: &Task) -> EdgeResult<()> {
        self.tasks.lock().await.insert(task.task_id, task.clone());
        Ok(())
    }

    async fn update(&self, task: &Task) -> EdgeResult<()> {
        let mut tasks = self.tasks.lock().await;
        match tasks.get_mut(&task.task_id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(EdgeError::TaskNotFound { id: task.task_id }),
        }
    }

    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Task>> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> EdgeResult<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .tasks
            .lock()
            .await
            .values()
            .filter(|t| filter.state.map_or(true, |state| t.state == state))
            .filter(|t| filter.schedule_id.map_or(true, |id| t.schedule_id == Some(id)))
            .filter(|t| {
                filter
                    .process_name
                    .as_ref()
                    .map_or(true, |name| &t.process_name == name)
            })
            .cloned()
            .collect();

        tasks.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        if let Some(limit) = filter.limit {
            tasks.truncate(limit.max(0) as usize);
        }
        Ok(tasks)
    }

    async fn get_running(&self) -> EdgeResult<Vec<Task>> {
        self.list(&TaskFilter {
            state: Some(TaskState::Running),
            ..Default::default()
        })
        .await
    }

    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> EdgeResult<u64> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, t| !(t.state.is_terminal() && t.end_time.is_some_and(|end| end < cutoff)));
        Ok((before - tasks.len()) as u64)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProcessRepository {
    processes: Arc<Mutex<HashMap<String, ScheduledProcess>>>,
}

impl InMemoryProcessRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessRepository for InMemoryProcessRepository {
    async fn get_all(&self) -> EdgeResult<Vec<ScheduledProcess>> {
        let mut processes: Vec<ScheduledProcess> =
            self.processes.lock().await.values().cloned().collect();
        processes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(processes)
    }

    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<ScheduledProcess>> {
        Ok(self.processes.lock().await.get(name).cloned())
    }

    async fn save(&self, process: &ScheduledProcess) -> EdgeResult<()> {
        self.processes
            .lock()
            .await
            .insert(process.name.clone(), process.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCategoryRepository {
    categories: Arc<Mutex<HashMap<String, ConfigCategory>>>,
}

impl InMemoryCategoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn get(&self, name: &str) -> EdgeResult<Option<ConfigCategory>> {
        Ok(self.categories.lock().await.get(name).cloned())
    }

    async fn save(&self, category: &ConfigCategory) -> EdgeResult<()> {
        self.categories
            .lock()
            .await
            .insert(category.name.clone(), category.clone());
        Ok(())
    }

    async fn list_names(&self) -> EdgeResult<Vec<String>> {
        let mut names: Vec<String> = self.categories.lock().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_list_sorted_newest_first_with_limit() {
        let repo = InMemoryTaskRepository::new();
        let mut first = Task::start("a", None, None);
        first.start_time = Utc::now() - chrono::Duration::seconds(10);
        let second = Task::start("b", None, None);
        repo.insert(&first).await.unwrap();
        repo.insert(&second).await.unwrap();

        let listed = repo
            .list(&TaskFilter {
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].task_id, second.task_id);
    }

    #[tokio::test]
    async fn test_schedule_name_unique() {
        let repo = InMemoryScheduleRepository::new();
        repo.insert(&Schedule::manual("backup", "backup").with_id(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(repo
            .insert(&Schedule::manual("backup", "backup").with_id(Uuid::new_v4()))
            .await
            .is_err());
        assert_eq!(repo.count().await, 1);
    }
}
