//! 边缘控制面可执行程序的组装层

pub mod app;
pub mod shutdown;
