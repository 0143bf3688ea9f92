//! # Edge Testing Utils
//!
//! 测试共用的替身实现与辅助工具：
//!
//! - **FakeProcessLauncher**：不启动真实进程，由测试控制何时退出
//! - **FakeServiceTransport**：按管理端口配置在线/离线，记录收到的 ping 与变更通知
//! - **TaskBuilder**：构造任务测试数据
//! - **TestEnv**：轮询等待异步条件成立
//!
//! ```toml
//! [dev-dependencies]
//! edge-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
