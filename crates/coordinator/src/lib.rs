//! 控制面的协调逻辑
//!
//! - [`scheduler::Scheduler`]：调度引擎，把调度计划变成运行中的进程
//! - [`health_monitor::ServiceMonitor`]：周期性探测注册的微服务
//! - [`change_notifier::ChangeNotifier`]：配置分类变更时通知订阅方
//! - [`recovery::TaskRecoveryService`]：启动时对账遗留的运行中任务

pub mod change_notifier;
pub mod health_monitor;
pub mod recovery;
pub mod schedule_timing;
pub mod scheduler;

pub use change_notifier::{ChangeNotifier, DeliveryOutcome, DeliveryStatus, NotificationReport};
pub use health_monitor::{ProbeOutcome, ServiceMonitor, SweepReport};
pub use recovery::{RecoveryReport, TaskRecoveryService, INTERRUPTED_REASON};
pub use scheduler::Scheduler;
