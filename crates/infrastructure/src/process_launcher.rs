use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use edge_core::models::ScheduledProcess;
use edge_core::traits::{LaunchContext, LaunchedProcess, ProcessControl, ProcessLauncher};
use edge_core::{EdgeError, EdgeResult};

/// 基于 `tokio::process` 的进程启动器
///
/// `script` 的第一个元素为可执行文件，其余为参数。进程的标准输出和标准错误
/// 按行写入 debug 日志。
#[derive(Debug, Clone, Default)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn launch(
        &self,
        process: &ScheduledProcess,
        context: &LaunchContext,
    ) -> EdgeResult<LaunchedProcess> {
        let (program, args) = process.script.split_first().ok_or_else(|| {
            EdgeError::TaskExecution(format!("进程 {} 未配置启动命令", process.name))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            EdgeError::TaskExecution(format!("启动进程 {} 失败: {e}", process.name))
        })?;

        let pid = child.id();
        info!(
            "已启动进程: {} (task_id={}, pid={:?})",
            process.name, context.task_id, pid
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(process.name.clone(), "stdout", stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(process.name.clone(), "stderr", stderr));
        }

        let kill_signal = Arc::new(Notify::new());
        let control = Arc::new(ChildControl {
            pid,
            kill_signal: kill_signal.clone(),
        });

        let process_name = process.name.clone();
        let exit = async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_signal.notified() => {
                    warn!("强制结束进程: {} (pid={:?})", process_name, pid);
                    child.start_kill().map_err(|e| {
                        EdgeError::TaskExecution(format!("结束进程 {process_name} 失败: {e}"))
                    })?;
                    child.wait().await
                }
            }
            .map_err(|e| EdgeError::TaskExecution(format!("等待进程结束失败: {e}")))?;

            debug!("进程 {} 已退出: {:?}", process_name, status);
            Ok::<_, EdgeError>(status.code())
        }
        .boxed();

        Ok(LaunchedProcess { pid, exit, control })
    }
}

async fn forward_output<R>(process_name: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(process = %process_name, stream, "{}", line);
    }
}

struct ChildControl {
    pid: Option<u32>,
    kill_signal: Arc<Notify>,
}

#[async_trait]
impl ProcessControl for ChildControl {
    async fn terminate(&self) -> EdgeResult<()> {
        // 进程已被回收
        let Some(pid) = self.pid else {
            return Ok(());
        };

        #[cfg(unix)]
        let output = Command::new("kill").arg(pid.to_string()).output().await;
        #[cfg(windows)]
        let output = Command::new("taskkill")
            .args(["/PID", &pid.to_string()])
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                debug!("已向进程发送终止请求: pid={}", pid);
                Ok(())
            }
            Ok(output) => Err(EdgeError::TaskExecution(format!(
                "终止进程 {pid} 失败: {}",
                String::from_utf8_lossy(&output.stderr)
            ))),
            Err(e) => Err(EdgeError::TaskExecution(format!("终止进程 {pid} 失败: {e}"))),
        }
    }

    async fn kill(&self) -> EdgeResult<()> {
        self.kill_signal.notify_one();
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn context() -> LaunchContext {
        LaunchContext {
            task_id: Uuid::new_v4(),
            schedule_name: None,
        }
    }

    #[tokio::test]
    async fn test_exit_code_is_reported() {
        let launcher = TokioProcessLauncher::new();
        let process = ScheduledProcess::new("fail", &["sh", "-c", "exit 3"]);

        let launched = launcher.launch(&process, &context()).await.unwrap();
        assert_eq!(launched.exit.await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_terminate_stops_process() {
        let launcher = TokioProcessLauncher::new();
        let process = ScheduledProcess::new("sleeper", &["sleep", "30"]);

        let launched = launcher.launch(&process, &context()).await.unwrap();
        launched.control.terminate().await.unwrap();

        let code = tokio::time::timeout(Duration::from_secs(5), launched.exit)
            .await
            .expect("process should exit")
            .unwrap();
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn test_kill_stops_process() {
        let launcher = TokioProcessLauncher::new();
        let process = ScheduledProcess::new("sleeper", &["sleep", "30"]);

        let launched = launcher.launch(&process, &context()).await.unwrap();
        launched.control.kill().await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), launched.exit).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_executable_fails() {
        let launcher = TokioProcessLauncher::new();
        let missing = ScheduledProcess::new("missing", &["/nonexistent/binary"]);
        assert!(launcher.launch(&missing, &context()).await.is_err());

        let empty = ScheduledProcess::new("empty", &[]);
        assert!(matches!(
            launcher.launch(&empty, &context()).await,
            Err(EdgeError::TaskExecution(_))
        ));
    }
}
