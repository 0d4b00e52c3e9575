//! 转向模块
//!
//! 基于条件规则为请求选择后端模型，并按规则修改提示词与元数据：
//! - 规则按优先级排序，最高优先级的命中规则生效
//! - 支持基于时间的模型偏好
//! - 规则目录热重载

mod engine;
pub mod injection;
mod types;

pub use engine::{default_steering_dir, SteeringEngine};
pub use injection::{apply_provider_settings, format_context_injection, inject_system_prompt};
pub use types::{
    ActivationRule, ChatMessage, RoutePreferences, RoutingContext, SteeringDecision,
    SteeringRule, TimeBasedRule,
};
