//! Routewise
//!
//! 本地 AI API 路由器的自动化层：
//! - `steering` 根据请求上下文选择模型、注入系统提示词
//! - `hooks` 事件总线与条件触发的自动化动作
//! - `condition` 规则与 Hook 共用的条件表达式
//! - `service` 按配置组装以上组件

pub mod condition;
pub mod config;
pub mod hooks;
pub mod loader;
pub mod logger;
pub mod service;
pub mod steering;
pub mod telemetry;
pub mod watcher;

pub use condition::{ConditionContext, ConditionError, ConditionEvaluator};
pub use config::{AutomationConfig, ConfigError};
pub use hooks::{EventBus, EventContext, EventEmitter, HookEvent, HookManager};
pub use service::{AutomationService, ReloadError, ReloadSummary, ServiceError};
pub use steering::{RoutingContext, SteeringDecision, SteeringEngine};
pub use telemetry::{MetricsRegistry, MetricsSnapshot};
