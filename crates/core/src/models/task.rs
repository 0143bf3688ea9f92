use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EdgeError;

/// 任务
///
/// 调度计划（或临时请求）的一次具体执行。状态只能从 `Running`
/// 单向流转到某个终止状态：
///
/// ```text
/// Running → Complete     进程退出，记录退出码
///         → Canceled     取消请求在进程自然退出前生效
///         → Interrupted  核心进程重启时任务仍在运行，结果无法确认
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub process_name: String,
    pub schedule_id: Option<Uuid>,
    pub schedule_name: Option<String>,
    pub state: TaskState,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub cancel_requested: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// 任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETE")]
    Complete,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "INTERRUPTED")]
    Interrupted,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Running => "RUNNING",
            TaskState::Complete => "COMPLETE",
            TaskState::Canceled => "CANCELED",
            TaskState::Interrupted => "INTERRUPTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Running)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(TaskState::Running),
            "COMPLETE" => Ok(TaskState::Complete),
            "CANCELED" => Ok(TaskState::Canceled),
            "INTERRUPTED" => Ok(TaskState::Interrupted),
            _ => Err(EdgeError::Serialization(format!("未知的任务状态: {s}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for TaskState {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for TaskState {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<TaskState>()
            .map_err(|_| format!("Invalid task state: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for TaskState {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 任务过滤器
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub schedule_id: Option<Uuid>,
    pub process_name: Option<String>,
    pub limit: Option<i64>,
}

impl Task {
    /// 创建一个处于运行状态的新任务
    pub fn start(process_name: &str, schedule_id: Option<Uuid>, schedule_name: Option<&str>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            process_name: process_name.to_string(),
            schedule_id,
            schedule_name: schedule_name.map(|s| s.to_string()),
            state: TaskState::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            cancel_requested: None,
            reason: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == TaskState::Running
    }

    /// 进程退出后结束任务
    ///
    /// 若此前已请求取消，任务进入 `Canceled`，否则进入 `Complete`。
    /// 已处于终止状态的任务保持不变并返回 false。
    pub fn finish(&mut self, exit_code: Option<i32>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = if self.cancel_requested.is_some() {
            TaskState::Canceled
        } else {
            TaskState::Complete
        };
        self.exit_code = exit_code;
        self.end_time = Some(Utc::now());
        true
    }

    /// 核心进程重启后标记无法确认结果的任务
    pub fn interrupt(&mut self, reason: &str) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Interrupted;
        self.end_time = Some(Utc::now());
        self.reason = Some(reason.to_string());
        true
    }

    pub fn execution_duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finish_records_exit_code() {
        let mut task = Task::start("sleep10", None, None);
        assert!(task.is_running());

        assert!(task.finish(Some(3)));
        assert_eq!(task.state, TaskState::Complete);
        assert_eq!(task.exit_code, Some(3));
        assert!(task.end_time.is_some());
        assert!(task.execution_duration_ms().is_some());
    }

    #[test]
    fn test_finish_after_cancel_request_is_canceled() {
        let mut task = Task::start("sleep10", Some(Uuid::new_v4()), Some("s"));
        task.cancel_requested = Some(Utc::now());

        assert!(task.finish(Some(-1)));
        assert_eq!(task.state, TaskState::Canceled);
    }

    #[test]
    fn test_terminal_states_never_reenter() {
        let mut task = Task::start("p", None, None);
        assert!(task.interrupt("core restarted"));
        assert_eq!(task.state, TaskState::Interrupted);

        assert!(!task.finish(Some(0)));
        assert!(!task.interrupt("again"));
        assert_eq!(task.state, TaskState::Interrupted);
        assert_eq!(task.reason.as_deref(), Some("core restarted"));
    }

    #[test]
    fn test_task_state_parsing() {
        assert_eq!("CANCELED".parse::<TaskState>().unwrap(), TaskState::Canceled);
        assert!("PENDING".parse::<TaskState>().is_err());
        assert!(!TaskState::Running.is_terminal());
        assert!(TaskState::Complete.is_terminal());
    }
}
