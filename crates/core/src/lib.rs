//! 边缘控制面核心库
//!
//! 定义实体模型、错误类型、配置以及协作方接口（持久化、进程启动、
//! HTTP 传输、配置变更回调）。具体实现位于 `edge-infrastructure`，
//! 调度与协调逻辑位于 `edge-coordinator`。

pub mod config;
pub mod errors;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use errors::*;
