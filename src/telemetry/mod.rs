//! 监控模块
//!
//! 提供转向与 Hook 系统的计数器注册表

mod metrics;

pub use metrics::{Counter, MetricsRegistry, MetricsSnapshot};
