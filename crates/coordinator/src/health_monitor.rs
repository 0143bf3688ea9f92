use std::sync::Arc;

use metrics::counter;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edge_core::config::MonitorConfig;
use edge_core::models::{ServiceRecord, ServiceStatus};
use edge_core::traits::ServiceTransport;
use edge_core::{EdgeError, EdgeResult};
use edge_infrastructure::ServiceRegistry;

/// 单个服务一轮探测的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    /// 连续 `max_attempts` 次失败，已从注册表移除
    Failed,
    /// 探测期间服务已被注销
    Gone,
}

/// 一轮完整探测的汇总
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub checked: usize,
    pub healthy: usize,
    pub removed: Vec<Uuid>,
}

struct MonitorHandle {
    stop_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

/// 服务健康监控
///
/// 周期性地 ping 注册表中的每个服务。第一次失败时服务标记为
/// `Unresponsive`，连续 `max_attempts` 次失败后标记为 `Failed`
/// 并从注册表移除。
pub struct ServiceMonitor {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn ServiceTransport>,
    config: MonitorConfig,
    handle: Mutex<Option<MonitorHandle>>,
}

impl ServiceMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn ServiceTransport>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            registry,
            transport,
            config,
            handle: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    pub async fn start(self: &Arc<Self>) -> EdgeResult<()> {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return Err(EdgeError::AlreadyStarted);
        }

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        let monitor = Arc::clone(self);
        let join = tokio::spawn(async move {
            info!(
                "服务健康监控已启动，探测间隔: {:?}",
                monitor.config.sleep_interval()
            );
            loop {
                // 停止信号同时打断进行中的探测与休眠
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    report = monitor.check_services() => {
                        debug!(
                            "完成一轮探测: {} 个服务, {} 个正常, {} 个被移除",
                            report.checked, report.healthy, report.removed.len()
                        );
                    }
                }
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    _ = tokio::time::sleep(monitor.config.sleep_interval()) => {}
                }
            }
            info!("服务健康监控已停止");
        });

        *handle = Some(MonitorHandle { stop_tx, join });
        Ok(())
    }

    pub async fn stop(&self) -> EdgeResult<()> {
        let Some(MonitorHandle { stop_tx, join }) = self.handle.lock().await.take() else {
            return Ok(());
        };
        let _ = stop_tx.send(());
        if let Err(e) = join.await {
            warn!("健康监控任务异常退出: {}", e);
        }
        Ok(())
    }

    /// 按注册顺序探测当前所有服务
    pub async fn check_services(&self) -> SweepReport {
        let services = self.registry.all().await;
        let mut report = SweepReport {
            checked: services.len(),
            ..Default::default()
        };

        for service in services {
            match self.probe_service(&service).await {
                ProbeOutcome::Healthy => report.healthy += 1,
                ProbeOutcome::Failed => report.removed.push(service.id),
                ProbeOutcome::Gone => {}
            }
        }
        report
    }

    async fn probe_service(&self, service: &ServiceRecord) -> ProbeOutcome {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.transport.ping(service, self.config.ping_timeout()).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(
                            "服务 {} 在第 {} 次尝试后恢复响应 (uptime: {:.1}s)",
                            service.name, attempt, response.uptime
                        );
                    }
                    // 上一轮被打断的探测可能留下 Unresponsive
                    if self
                        .registry
                        .mark_status(service.id, ServiceStatus::Running)
                        .await
                        .is_err()
                    {
                        return ProbeOutcome::Gone;
                    }
                    return ProbeOutcome::Healthy;
                }
                Err(e) => {
                    counter!("edge_monitor_probe_failures_total", "service" => service.name.clone())
                        .increment(1);
                    debug!(
                        "服务 {} 探测失败 ({}/{}): {}",
                        service.name, attempt, max_attempts, e
                    );

                    if attempt == 1 {
                        warn!("服务 {} 无响应: {}", service.name, e);
                        if self
                            .registry
                            .mark_status(service.id, ServiceStatus::Unresponsive)
                            .await
                            .is_err()
                        {
                            return ProbeOutcome::Gone;
                        }
                    }

                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                        if self.registry.get_by_id(service.id).await.is_err() {
                            debug!("服务 {} 已注销，停止探测", service.name);
                            return ProbeOutcome::Gone;
                        }
                    }
                }
            }
        }

        error!(
            "服务 {} ({}) 连续 {} 次探测失败，从注册表移除",
            service.name,
            service.management_url(),
            max_attempts
        );
        if self
            .registry
            .mark_status(service.id, ServiceStatus::Failed)
            .await
            .is_err()
        {
            return ProbeOutcome::Gone;
        }
        match self.registry.unregister(service.id).await {
            Ok(_) => {
                counter!("edge_monitor_services_removed_total").increment(1);
                ProbeOutcome::Failed
            }
            Err(e) if e.is_not_found() => ProbeOutcome::Gone,
            Err(e) => {
                error!("移除服务 {} 失败: {}", service.name, e);
                ProbeOutcome::Gone
            }
        }
    }
}
