use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use edge_core::models::Task;
use edge_core::traits::TaskRepository;
use edge_core::EdgeResult;

/// 重启后结果未知的任务写入的原因
pub const INTERRUPTED_REASON: &str = "核心进程重启时任务仍在运行，执行结果未知";

/// 启动对账报告
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub interrupted_tasks: Vec<Task>,
    pub recovery_duration_ms: u64,
}

/// 启动对账服务
///
/// 上一次运行遗留的 RUNNING 任务不可能仍由本进程管理，全部标记为 INTERRUPTED。
/// 任一持久化失败都会中止对账并返回错误，调度器随之拒绝启动。
pub struct TaskRecoveryService {
    task_repo: Arc<dyn TaskRepository>,
}

impl TaskRecoveryService {
    pub fn new(task_repo: Arc<dyn TaskRepository>) -> Self {
        Self { task_repo }
    }

    pub async fn recover_interrupted_tasks(&self) -> EdgeResult<RecoveryReport> {
        let started = Instant::now();
        let running = self.task_repo.get_running().await?;
        if !running.is_empty() {
            info!("发现 {} 个遗留的运行中任务，开始对账", running.len());
        }

        let mut interrupted_tasks = Vec::with_capacity(running.len());
        for mut task in running {
            if task.interrupt(INTERRUPTED_REASON) {
                self.task_repo.update(&task).await?;
                warn!(
                    "任务 {} ({}) 标记为中断",
                    task.task_id, task.process_name
                );
                interrupted_tasks.push(task);
            }
        }

        Ok(RecoveryReport {
            interrupted_tasks,
            recovery_duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}
