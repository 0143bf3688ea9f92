use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EdgeError, EdgeResult};

/// 调度计划
///
/// 描述何时、以何种方式运行一个已登记的进程（`process_name` 指向
/// [`ScheduledProcess`]）。
///
/// # 字段说明
///
/// - `schedule_id`: 唯一标识，`Uuid::nil()` 表示尚未分配，由调度器在保存时生成
/// - `name`: 全局唯一的可读名称
/// - `schedule_type`: 调度类型，创建后不可修改
/// - `repeat`: INTERVAL 的间隔，为零时表示只执行一次
/// - `time_of_day` / `day_of_week`: TIMED 的触发时间，`day_of_week` 取值 1=周一..7=周日，
///   为空表示每天触发
/// - `exclusive`: 为 true 时同一计划不允许同时存在两个运行中的任务
///
/// # 使用示例
///
/// ```rust
/// use edge_core::models::{Schedule, ScheduleType};
/// use std::time::Duration;
///
/// let schedule = Schedule::interval("purge", "purge_process", Duration::from_secs(3600));
/// assert_eq!(schedule.schedule_type, ScheduleType::Interval);
/// assert!(schedule.exclusive);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub schedule_id: Uuid,
    pub name: String,
    pub process_name: String,
    pub schedule_type: ScheduleType,
    pub repeat: Duration,
    pub time_of_day: Option<NaiveTime>,
    pub day_of_week: Option<u8>,
    pub enabled: bool,
    pub exclusive: bool,
}

/// 调度类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleType {
    #[serde(rename = "STARTUP")]
    Startup,
    #[serde(rename = "TIMED")]
    Timed,
    #[serde(rename = "INTERVAL")]
    Interval,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Startup => "STARTUP",
            ScheduleType::Timed => "TIMED",
            ScheduleType::Interval => "INTERVAL",
            ScheduleType::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ScheduleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScheduleType {
    type Err = EdgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTUP" => Ok(ScheduleType::Startup),
            "TIMED" => Ok(ScheduleType::Timed),
            "INTERVAL" => Ok(ScheduleType::Interval),
            "MANUAL" => Ok(ScheduleType::Manual),
            _ => Err(EdgeError::InvalidSchedule(format!("未知的调度类型: {s}"))),
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for ScheduleType {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for ScheduleType {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        s.parse::<ScheduleType>()
            .map_err(|_| format!("Invalid schedule type: {s}").into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for ScheduleType {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

impl Schedule {
    fn base(name: &str, process_name: &str, schedule_type: ScheduleType) -> Self {
        Self {
            schedule_id: Uuid::nil(), // 将由调度器生成
            name: name.to_string(),
            process_name: process_name.to_string(),
            schedule_type,
            repeat: Duration::ZERO,
            time_of_day: None,
            day_of_week: None,
            enabled: true,
            exclusive: true,
        }
    }

    /// 调度器启动时执行一次
    pub fn startup(name: &str, process_name: &str) -> Self {
        Self::base(name, process_name, ScheduleType::Startup)
    }

    /// 按固定间隔执行
    pub fn interval(name: &str, process_name: &str, repeat: Duration) -> Self {
        Self {
            repeat,
            ..Self::base(name, process_name, ScheduleType::Interval)
        }
    }

    /// 在指定的星期几和时刻执行，`day_of_week` 为空表示每天
    pub fn timed(
        name: &str,
        process_name: &str,
        time_of_day: NaiveTime,
        day_of_week: Option<u8>,
    ) -> Self {
        Self {
            time_of_day: Some(time_of_day),
            day_of_week,
            ..Self::base(name, process_name, ScheduleType::Timed)
        }
    }

    /// 仅通过 queue_task 手动触发
    pub fn manual(name: &str, process_name: &str) -> Self {
        Self::base(name, process_name, ScheduleType::Manual)
    }

    pub fn with_exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_id(mut self, schedule_id: Uuid) -> Self {
        self.schedule_id = schedule_id;
        self
    }

    pub fn has_id(&self) -> bool {
        !self.schedule_id.is_nil()
    }

    /// 检查与调度类型相关的字段是否合法
    pub fn validate(&self) -> EdgeResult<()> {
        if self.name.trim().is_empty() {
            return Err(EdgeError::InvalidSchedule("调度计划名称不能为空".to_string()));
        }
        if self.process_name.trim().is_empty() {
            return Err(EdgeError::InvalidSchedule(format!(
                "调度计划 {} 未指定进程",
                self.name
            )));
        }
        if let Some(day) = self.day_of_week {
            if !(1..=7).contains(&day) {
                return Err(EdgeError::InvalidSchedule(format!(
                    "day_of_week 必须在 1..=7 之间，实际为 {day}"
                )));
            }
        }
        if self.schedule_type == ScheduleType::Timed && self.time_of_day.is_none() {
            return Err(EdgeError::InvalidSchedule(format!(
                "TIMED 调度计划 {} 必须指定 time_of_day",
                self.name
            )));
        }
        Ok(())
    }
}

/// 可被调度的进程描述
///
/// `script` 是启动进程的完整命令行，第一个元素为可执行文件。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledProcess {
    pub name: String,
    pub script: Vec<String>,
}

impl ScheduledProcess {
    pub fn new(name: &str, script: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            script: script.iter().map(|s| s.to_string()).collect(),
        }
    }
}
