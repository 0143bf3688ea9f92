use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use edge_core::config::TransportConfig;
use edge_core::models::{ChangeNotification, ServiceRecord};
use edge_core::traits::{PingResponse, ServiceTransport};
use edge_core::{EdgeError, EdgeResult};

/// 基于 reqwest 的管理端口传输层
///
/// 所有请求都发往 `{protocol}://{address}:{management_port}{path_prefix}` 之下。
#[derive(Debug, Clone)]
pub struct HttpServiceTransport {
    client: reqwest::Client,
    path_prefix: String,
}

impl HttpServiceTransport {
    pub fn new(config: &TransportConfig) -> EdgeResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| EdgeError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            path_prefix: config.path_prefix.trim_end_matches('/').to_string(),
        })
    }

    pub fn ping_url(&self, service: &ServiceRecord) -> String {
        format!("{}{}/service/ping", service.management_url(), self.path_prefix)
    }

    pub fn change_url(&self, service: &ServiceRecord) -> String {
        format!("{}{}/change", service.management_url(), self.path_prefix)
    }
}

fn map_request_error(url: &str, error: reqwest::Error) -> EdgeError {
    if error.is_timeout() {
        EdgeError::Timeout(format!("{url}: {error}"))
    } else {
        EdgeError::Network(format!("{url}: {error}"))
    }
}

#[async_trait]
impl ServiceTransport for HttpServiceTransport {
    async fn ping(&self, service: &ServiceRecord, timeout: Duration) -> EdgeResult<PingResponse> {
        let url = self.ping_url(service);
        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::Network(format!("{url} 返回 {status}")));
        }

        let ping: PingResponse = response
            .json()
            .await
            .map_err(|e| EdgeError::Network(format!("{url} 应答无法解析: {e}")))?;
        debug!("服务 {} 在线，uptime {:.1}s", service.name, ping.uptime);
        Ok(ping)
    }

    async fn notify_change(
        &self,
        service: &ServiceRecord,
        notification: &ChangeNotification,
        timeout: Duration,
    ) -> EdgeResult<()> {
        let url = self.change_url(service);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(notification)
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EdgeError::Network(format!("{url} 返回 {status}")));
        }
        Ok(())
    }
}
