use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::{error, info};

use edge_coordinator::{ChangeNotifier, Scheduler, ServiceMonitor};
use edge_core::AppConfig;
use edge_infrastructure::{
    ConfigurationCache, ConfigurationManager, DatabaseManager, HttpServiceTransport,
    InterestRegistry, ServiceRegistry, SqliteCategoryRepository, SqliteProcessRepository,
    SqliteScheduleRepository, SqliteTaskRepository, TokioProcessLauncher,
};

/// 控制面应用
///
/// 持有所有组件。调度器与健康监控作为一对启动和停止。
pub struct Application {
    database: DatabaseManager,
    scheduler: Scheduler,
    monitor: Arc<ServiceMonitor>,
    services: Arc<ServiceRegistry>,
    interests: Arc<InterestRegistry>,
    configuration: Arc<ConfigurationManager>,
    // 配置管理器只持有监听器的弱引用
    _notifier: Arc<ChangeNotifier>,
}

impl Application {
    /// 创建新的应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化控制面，数据库: {}", config.database.url);

        let database = DatabaseManager::new(&config.database)
            .await
            .with_context(|| format!("初始化数据库失败: {}", config.database.url))?;
        let pool = database.pool().clone();

        let cache = Arc::new(ConfigurationCache::new(config.cache.max_cache_size));
        let configuration = Arc::new(ConfigurationManager::new(
            Arc::new(SqliteCategoryRepository::new(pool.clone())),
            cache,
        ));

        let services = Arc::new(ServiceRegistry::new());
        let interests = Arc::new(InterestRegistry::new(configuration.clone()));
        let transport = Arc::new(
            HttpServiceTransport::new(&config.transport).context("创建HTTP传输层失败")?,
        );

        let notifier = Arc::new(ChangeNotifier::new(
            interests.clone(),
            services.clone(),
            configuration.clone(),
            transport.clone(),
            config.transport.delivery_timeout(),
        ));
        configuration.set_change_listener(notifier.clone()).await;

        let scheduler = Scheduler::new(
            Arc::new(SqliteScheduleRepository::new(pool.clone())),
            Arc::new(SqliteTaskRepository::new(pool.clone())),
            Arc::new(SqliteProcessRepository::new(pool)),
            Arc::new(TokioProcessLauncher::new()),
            config.scheduler.clone(),
        );
        let monitor = Arc::new(ServiceMonitor::new(
            services.clone(),
            transport,
            config.monitor.clone(),
        ));

        Ok(Self {
            database,
            scheduler,
            monitor,
            services,
            interests,
            configuration,
            _notifier: notifier,
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn monitor(&self) -> &Arc<ServiceMonitor> {
        &self.monitor
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn interests(&self) -> &Arc<InterestRegistry> {
        &self.interests
    }

    pub fn configuration(&self) -> &Arc<ConfigurationManager> {
        &self.configuration
    }

    /// 启动调度器和健康监控，任一失败时两者都不运行
    pub async fn start(&self) -> Result<()> {
        self.scheduler.start().await.context("启动调度器失败")?;

        if let Err(e) = self.monitor.start().await {
            if let Err(stop_err) = self.scheduler.stop().await {
                error!("回滚调度器失败: {stop_err}");
            }
            return Err(e).context("启动健康监控失败");
        }

        info!("控制面已启动");
        Ok(())
    }

    /// 停止健康监控和调度器并关闭数据库
    pub async fn stop(&self) -> Result<()> {
        info!("停止控制面");
        self.monitor.stop().await.context("停止健康监控失败")?;
        self.scheduler.stop().await.context("停止调度器失败")?;
        self.database.close().await;
        info!("控制面已停止");
        Ok(())
    }

    /// 启动后一直运行到收到关闭信号
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.start().await?;
        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号");
        self.stop().await
    }
}
