//! Test data builders

use chrono::{DateTime, Utc};
use uuid::Uuid;

use edge_core::models::{Task, TaskState};

/// Builder for creating test Task instances
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(process_name: &str) -> Self {
        Self {
            task: Task::start(process_name, None, None),
        }
    }

    pub fn with_id(mut self, task_id: Uuid) -> Self {
        self.task.task_id = task_id;
        self
    }

    pub fn with_schedule(mut self, schedule_id: Uuid, schedule_name: &str) -> Self {
        self.task.schedule_id = Some(schedule_id);
        self.task.schedule_name = Some(schedule_name.to_string());
        self
    }

    pub fn started_at(mut self, start_time: DateTime<Utc>) -> Self {
        self.task.start_time = start_time;
        self
    }

    /// 已结束的任务，`end_time` 取给定时刻
    pub fn finished(mut self, exit_code: i32, end_time: DateTime<Utc>) -> Self {
        self.task.state = TaskState::Complete;
        self.task.exit_code = Some(exit_code);
        self.task.end_time = Some(end_time);
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}
