//! 进程启动接口
//!
//! 调度器本身不包含任何进程语义：给定一个 [`ScheduledProcess`]，
//! `ProcessLauncher` 负责把它启动起来，并返回一个可等待退出码的
//! future 以及用于终止进程的控制句柄。

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::models::ScheduledProcess;
use crate::EdgeResult;

/// 启动进程时附带的上下文
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub task_id: Uuid,
    pub schedule_name: Option<String>,
}

/// 已启动的进程
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    /// 进程退出时完成，给出退出码（被信号终止时为 None）
    pub exit: BoxFuture<'static, EdgeResult<Option<i32>>>,
    pub control: Arc<dyn ProcessControl>,
}

/// 对运行中进程的控制
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// 请求进程自行退出
    async fn terminate(&self) -> EdgeResult<()>;

    /// 强制结束进程
    async fn kill(&self) -> EdgeResult<()>;
}

/// 进程启动器
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(
        &self,
        process: &ScheduledProcess,
        context: &LaunchContext,
    ) -> EdgeResult<LaunchedProcess>;
}
