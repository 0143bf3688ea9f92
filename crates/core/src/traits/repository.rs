//! 持久化层接口定义
//!
//! 控制面把调度计划、任务、进程描述和配置分类视为写穿透的外部存储，
//! 本模块只定义核心需要的最小接口：
//! - `ScheduleRepository` - 调度计划的增删改查
//! - `TaskRepository` - 任务执行实例的生命周期记录
//! - `ProcessRepository` - 可调度进程的描述
//! - `CategoryRepository` - 配置分类的存取
//!
//! 所有接口都是异步的并要求 `Send + Sync`，以便以 `Arc<dyn ...>` 的形式注入。
//! 基础设施层提供 SQLite 与内存两种实现。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use edge_core::traits::TaskRepository;
//! use edge_core::models::{TaskFilter, TaskState};
//!
//! async fn running_count(repo: &dyn TaskRepository) -> EdgeResult<usize> {
//!     let filter = TaskFilter {
//!         state: Some(TaskState::Running),
//!         ..Default::default()
//!     };
//!     Ok(repo.list(&filter).await?.len())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ConfigCategory, Schedule, ScheduledProcess, Task, TaskFilter};
use crate::EdgeResult;

/// 调度计划仓储接口
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 查询全部调度计划，按名称排序
    async fn get_all(&self) -> EdgeResult<Vec<Schedule>>;

    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Schedule>>;

    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<Schedule>>;

    /// 插入新计划，调用方保证 `schedule_id` 已分配
    async fn insert(&self, schedule: &Schedule) -> EdgeResult<()>;

    /// 更新已有计划，不存在时返回 `ScheduleNotFound`
    async fn update(&self, schedule: &Schedule) -> EdgeResult<()>;

    /// 删除计划，不存在时返回 `ScheduleNotFound`
    async fn delete(&self, id: Uuid) -> EdgeResult<()>;
}

/// 任务仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn insert(&self, task: &Task) -> EdgeResult<()>;

    /// 覆盖写入任务的全部可变字段，不存在时返回 `TaskNotFound`
    async fn update(&self, task: &Task) -> EdgeResult<()>;

    async fn get_by_id(&self, id: Uuid) -> EdgeResult<Option<Task>>;

    /// 按过滤条件查询，结果按开始时间倒序
    async fn list(&self, filter: &TaskFilter) -> EdgeResult<Vec<Task>>;

    /// 查询仍处于 RUNNING 状态的任务，启动时对账使用
    async fn get_running(&self) -> EdgeResult<Vec<Task>>;

    /// 删除结束时间早于 `cutoff` 的终止任务，返回删除数量
    async fn delete_finished_before(&self, cutoff: DateTime<Utc>) -> EdgeResult<u64>;
}

/// 可调度进程仓储接口
#[async_trait]
pub trait ProcessRepository: Send + Sync {
    async fn get_all(&self) -> EdgeResult<Vec<ScheduledProcess>>;

    async fn get_by_name(&self, name: &str) -> EdgeResult<Option<ScheduledProcess>>;

    /// 按名称插入或覆盖
    async fn save(&self, process: &ScheduledProcess) -> EdgeResult<()>;
}

/// 配置分类仓储接口
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn get(&self, name: &str) -> EdgeResult<Option<ConfigCategory>>;

    /// 按名称插入或覆盖
    async fn save(&self, category: &ConfigCategory) -> EdgeResult<()>;

    async fn list_names(&self) -> EdgeResult<Vec<String>>;
}
