use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{ChangeNotification, ServiceRecord};
use crate::EdgeResult;

/// ping 端点的应答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingResponse {
    /// 服务已运行的秒数
    pub uptime: f64,
}

/// 与微服务管理端口通信的传输层
///
/// 4xx/5xx 应答、超时和连接错误都视为失败。
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    async fn ping(&self, service: &ServiceRecord, timeout: Duration) -> EdgeResult<PingResponse>;

    async fn notify_change(
        &self,
        service: &ServiceRecord,
        notification: &ChangeNotification,
        timeout: Duration,
    ) -> EdgeResult<()>;
}
