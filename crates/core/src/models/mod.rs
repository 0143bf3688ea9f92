//! # 数据模型
//!
//! 控制面拥有的全部实体：
//!
//! - [`Schedule`] / [`ScheduledProcess`]：调度计划及其引用的进程描述
//! - [`Task`]：调度计划的一次执行，带单向状态机
//! - [`ServiceRecord`]：服务注册表中的微服务实例
//! - [`InterestRecord`]：微服务对配置分类的订阅
//! - [`ConfigCategory`]：配置分类及其配置项
//!
//! 所有时间字段使用 `DateTime<Utc>`，状态字段使用枚举，全部实现 serde 序列化。

pub mod category;
pub mod interest;
pub mod schedule;
pub mod service;
pub mod task;

pub use category::*;
pub use interest::*;
pub use schedule::*;
pub use service::*;
pub use task::*;
