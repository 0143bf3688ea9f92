//! Test doubles for the process launcher and the service transport

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use edge_core::models::{ChangeNotification, ScheduledProcess, ServiceRecord};
use edge_core::traits::{
    LaunchContext, LaunchedProcess, PingResponse, ProcessControl, ProcessLauncher,
    ServiceTransport,
};
use edge_core::{EdgeError, EdgeResult};

type ExitSender = Arc<Mutex<Option<oneshot::Sender<Option<i32>>>>>;

/// 一次启动记录
#[derive(Debug, Clone)]
pub struct LaunchRecord {
    pub task_id: Uuid,
    pub process_name: String,
    pub schedule_name: Option<String>,
}

/// 不启动真实进程的启动器
///
/// 进程在测试调用 [`complete`](Self::complete)、收到终止请求或自动退出时结束。
#[derive(Default)]
pub struct FakeProcessLauncher {
    launches: Mutex<Vec<LaunchRecord>>,
    exits: Mutex<HashMap<Uuid, ExitSender>>,
    failing: Mutex<HashSet<String>>,
    terminate_requests: Arc<Mutex<Vec<Uuid>>>,
    kill_requests: Arc<Mutex<Vec<Uuid>>>,
    ignore_terminate: bool,
    ignore_kill: bool,
    auto_exit: Option<(Duration, i32)>,
}

impl FakeProcessLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每个进程在 `after` 之后以 `exit_code` 自动退出
    pub fn with_auto_exit(mut self, after: Duration, exit_code: i32) -> Self {
        self.auto_exit = Some((after, exit_code));
        self
    }

    /// 终止请求不生效，只有强制结束才会让进程退出
    pub fn ignoring_terminate(mut self) -> Self {
        self.ignore_terminate = true;
        self
    }

    /// 强制结束也不生效，进程只能由测试调用 [`complete`](Self::complete) 结束
    pub fn ignoring_kill(mut self) -> Self {
        self.ignore_terminate = true;
        self.ignore_kill = true;
        self
    }

    /// 之后启动该进程都会失败
    pub async fn fail_process(&self, process_name: &str) {
        self.failing.lock().await.insert(process_name.to_string());
    }

    pub async fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().await.clone()
    }

    pub async fn launch_count(&self) -> usize {
        self.launches.lock().await.len()
    }

    pub async fn launches_of(&self, process_name: &str) -> usize {
        self.launches
            .lock()
            .await
            .iter()
            .filter(|l| l.process_name == process_name)
            .count()
    }

    pub async fn terminate_requests(&self) -> Vec<Uuid> {
        self.terminate_requests.lock().await.clone()
    }

    pub async fn kill_requests(&self) -> Vec<Uuid> {
        self.kill_requests.lock().await.clone()
    }

    /// 让指定任务的进程以 `exit_code` 退出，进程已退出时返回 false
    pub async fn complete(&self, task_id: Uuid, exit_code: i32) -> bool {
        let sender = self.exits.lock().await.get(&task_id).cloned();
        match sender {
            Some(sender) => send_exit(&sender, Some(exit_code)).await,
            None => false,
        }
    }

    /// 让所有仍在运行的进程退出，返回退出的数量
    pub async fn complete_all(&self, exit_code: i32) -> usize {
        let senders: Vec<ExitSender> = self.exits.lock().await.values().cloned().collect();
        let mut completed = 0;
        for sender in senders {
            if send_exit(&sender, Some(exit_code)).await {
                completed += 1;
            }
        }
        completed
    }
}

async fn send_exit(sender: &ExitSender, exit_code: Option<i32>) -> bool {
    match sender.lock().await.take() {
        Some(tx) => tx.send(exit_code).is_ok(),
        None => false,
    }
}

#[async_trait]
impl ProcessLauncher for FakeProcessLauncher {
    async fn launch(
        &self,
        process: &ScheduledProcess,
        context: &LaunchContext,
    ) -> EdgeResult<LaunchedProcess> {
        if self.failing.lock().await.contains(&process.name) {
            return Err(EdgeError::TaskExecution(format!(
                "启动进程 {} 失败",
                process.name
            )));
        }

        let (tx, rx) = oneshot::channel();
        let sender: ExitSender = Arc::new(Mutex::new(Some(tx)));
        self.exits
            .lock()
            .await
            .insert(context.task_id, sender.clone());
        self.launches.lock().await.push(LaunchRecord {
            task_id: context.task_id,
            process_name: process.name.clone(),
            schedule_name: context.schedule_name.clone(),
        });

        if let Some((after, exit_code)) = self.auto_exit {
            let sender = sender.clone();
            tokio::spawn(async move {
                tokio::time::sleep(after).await;
                send_exit(&sender, Some(exit_code)).await;
            });
        }

        let control = Arc::new(FakeProcessControl {
            task_id: context.task_id,
            exit: sender,
            ignore_terminate: self.ignore_terminate,
            ignore_kill: self.ignore_kill,
            terminate_requests: self.terminate_requests.clone(),
            kill_requests: self.kill_requests.clone(),
        });

        let exit = async move { Ok::<_, EdgeError>(rx.await.unwrap_or(None)) }.boxed();

        Ok(LaunchedProcess {
            pid: None,
            exit,
            control,
        })
    }
}

struct FakeProcessControl {
    task_id: Uuid,
    exit: ExitSender,
    ignore_terminate: bool,
    ignore_kill: bool,
    terminate_requests: Arc<Mutex<Vec<Uuid>>>,
    kill_requests: Arc<Mutex<Vec<Uuid>>>,
}

#[async_trait]
impl ProcessControl for FakeProcessControl {
    async fn terminate(&self) -> EdgeResult<()> {
        self.terminate_requests.lock().await.push(self.task_id);
        if !self.ignore_terminate {
            send_exit(&self.exit, None).await;
        }
        Ok(())
    }

    async fn kill(&self) -> EdgeResult<()> {
        self.kill_requests.lock().await.push(self.task_id);
        if !self.ignore_kill {
            send_exit(&self.exit, None).await;
        }
        Ok(())
    }
}

/// 按管理端口模拟微服务的传输层
#[derive(Default)]
pub struct FakeServiceTransport {
    unreachable: Mutex<HashSet<u16>>,
    failures_remaining: Mutex<HashMap<u16, u32>>,
    ping_counts: Mutex<HashMap<u16, usize>>,
    failing_changes: Mutex<HashSet<u16>>,
    change_delays: Mutex<HashMap<u16, Duration>>,
    notifications: Mutex<Vec<(u16, ChangeNotification)>>,
}

impl FakeServiceTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_unreachable(&self, management_port: u16) {
        self.unreachable.lock().await.insert(management_port);
    }

    pub async fn set_reachable(&self, management_port: u16) {
        self.unreachable.lock().await.remove(&management_port);
    }

    /// 接下来的 `count` 次 ping 失败
    pub async fn fail_next_pings(&self, management_port: u16, count: u32) {
        self.failures_remaining
            .lock()
            .await
            .insert(management_port, count);
    }

    pub async fn ping_count(&self, management_port: u16) -> usize {
        self.ping_counts
            .lock()
            .await
            .get(&management_port)
            .copied()
            .unwrap_or(0)
    }

    pub async fn fail_changes(&self, management_port: u16) {
        self.failing_changes.lock().await.insert(management_port);
    }

    pub async fn delay_changes(&self, management_port: u16, delay: Duration) {
        self.change_delays
            .lock()
            .await
            .insert(management_port, delay);
    }

    /// 成功送达的变更通知
    pub async fn notifications(&self) -> Vec<(u16, ChangeNotification)> {
        self.notifications.lock().await.clone()
    }
}

#[async_trait]
impl ServiceTransport for FakeServiceTransport {
    async fn ping(&self, service: &ServiceRecord, _timeout: Duration) -> EdgeResult<PingResponse> {
        let port = service.management_port;
        *self.ping_counts.lock().await.entry(port).or_insert(0) += 1;

        if self.unreachable.lock().await.contains(&port) {
            return Err(EdgeError::Network(format!("{} 不可达", service.management_url())));
        }
        if let Some(remaining) = self.failures_remaining.lock().await.get_mut(&port) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EdgeError::Network(format!("{} 不可达", service.management_url())));
            }
        }
        Ok(PingResponse { uptime: 1.0 })
    }

    async fn notify_change(
        &self,
        service: &ServiceRecord,
        notification: &ChangeNotification,
        _timeout: Duration,
    ) -> EdgeResult<()> {
        let port = service.management_port;
        let delay = self.change_delays.lock().await.get(&port).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_changes.lock().await.contains(&port) {
            return Err(EdgeError::Network(format!(
                "{} 拒绝变更通知",
                service.management_url()
            )));
        }
        self.notifications
            .lock()
            .await
            .push((port, notification.clone()));
        Ok(())
    }
}
